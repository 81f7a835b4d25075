//! Attribution of document changes
//!
//! Every transaction on the replicated document carries a `yrs` origin.
//! Local and remote origins are encoded as `local:<identity>` and
//! `remote:<identity>`; the undo manager supplies its own opaque origin.

use std::fmt;

use yrs::Origin;

const LOCAL_PREFIX: &str = "local:";
const REMOTE_PREFIX: &str = "remote:";

/// Who caused a change to the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// An edit submitted by the client with this identity
    Local(String),
    /// An update merged from the peer with this identity
    Remote(String),
    /// An undo or redo performed by the session's undo manager
    UndoRedo,
    /// A transaction with no recognizable origin
    Unattributed,
}

impl ChangeOrigin {
    /// Convert to the `yrs` origin used when opening a transaction
    pub fn to_origin(&self) -> Option<Origin> {
        match self {
            Self::Local(id) => Some(Origin::from(format!("{LOCAL_PREFIX}{id}").as_str())),
            Self::Remote(id) => Some(Origin::from(format!("{REMOTE_PREFIX}{id}").as_str())),
            Self::UndoRedo | Self::Unattributed => None,
        }
    }

    /// Classify the origin of a committed transaction
    pub fn classify(origin: Option<&Origin>, undo_origin: Option<&Origin>) -> Self {
        let Some(origin) = origin else {
            return Self::Unattributed;
        };
        if undo_origin == Some(origin) {
            return Self::UndoRedo;
        }
        let Ok(text) = std::str::from_utf8(origin.as_ref()) else {
            return Self::Unattributed;
        };
        if let Some(id) = text.strip_prefix(LOCAL_PREFIX) {
            Self::Local(id.to_string())
        } else if let Some(id) = text.strip_prefix(REMOTE_PREFIX) {
            Self::Remote(id.to_string())
        } else {
            Self::Unattributed
        }
    }

    /// Whether this change was made on behalf of `identity`
    ///
    /// Undo/redo transactions always act for the session that owns the
    /// undo manager.
    pub fn acts_for(&self, identity: &str) -> bool {
        match self {
            Self::Local(id) => id == identity,
            Self::UndoRedo => true,
            Self::Remote(_) | Self::Unattributed => false,
        }
    }

    /// Whether this is a plain local edit by `identity`
    pub fn is_local_edit_of(&self, identity: &str) -> bool {
        matches!(self, Self::Local(id) if id == identity)
    }
}

impl fmt::Display for ChangeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local({id})"),
            Self::Remote(id) => write!(f, "remote({id})"),
            Self::UndoRedo => f.write_str("undo-redo"),
            Self::Unattributed => f.write_str("unattributed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_and_remote_roundtrip() {
        let local = ChangeOrigin::Local("a".to_string());
        let origin = local.to_origin().unwrap();
        assert_eq!(ChangeOrigin::classify(Some(&origin), None), local);

        let remote = ChangeOrigin::Remote("b".to_string());
        let origin = remote.to_origin().unwrap();
        assert_eq!(ChangeOrigin::classify(Some(&origin), None), remote);
    }

    #[test]
    fn undo_origin_wins() {
        let undo = Origin::from("undo-manager");
        assert_eq!(
            ChangeOrigin::classify(Some(&undo), Some(&undo)),
            ChangeOrigin::UndoRedo
        );
    }

    #[test]
    fn unknown_origins() {
        assert_eq!(ChangeOrigin::classify(None, None), ChangeOrigin::Unattributed);
        let other = Origin::from("something-else");
        assert_eq!(
            ChangeOrigin::classify(Some(&other), None),
            ChangeOrigin::Unattributed
        );
    }

    #[test]
    fn acting_identity() {
        assert!(ChangeOrigin::Local("a".into()).acts_for("a"));
        assert!(!ChangeOrigin::Local("a".into()).acts_for("b"));
        assert!(ChangeOrigin::UndoRedo.acts_for("a"));
        assert!(!ChangeOrigin::UndoRedo.is_local_edit_of("a"));
        assert!(!ChangeOrigin::Remote("a".into()).acts_for("a"));
    }
}
