//! Binary payload encoding
//!
//! State vectors and updates travel inside JSON as standard base64 strings.
//! Used through `#[serde(with = "crate::payload")]`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(bytes))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    STANDARD
        .decode(text.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "crate::payload")]
        bytes: Vec<u8>,
    }

    #[test]
    fn encodes_as_base64() {
        let json = serde_json::to_string(&Wrapper {
            bytes: vec![1, 2, 255],
        })
        .unwrap();
        assert_eq!(json, r#"{"bytes":"AQL/"}"#);
    }

    #[test]
    fn rejects_comma_separated_bytes() {
        let result = serde_json::from_str::<Wrapper>(r#"{"bytes":"1,2,255"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_string() {
        let result = serde_json::from_str::<Wrapper>(r#"{"bytes":[1,2]}"#);
        assert!(result.is_err());
    }
}
