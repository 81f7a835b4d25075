//! Mapping between the editor's document and the replicated primitives
//!
//! The codec is a set of stateless functions over a `yrs` transaction.
//! Encoding writes only what differs from the replicated state, so
//! re-encoding an unchanged document commits no update at all.

mod blocks;
mod comments;
mod value;

pub use blocks::{
    decode_blocks, encode_blocks, order_key, stored_order_keys, BLOCKS, ORDER_PREFIX, ROOT_PARENT,
};
pub use comments::{decode_comments, encode_comments, COMMENTS};
pub use value::{any_to_json, json_to_any};

use std::sync::Arc;

use yrs::{Any, Map, ReadTxn, TransactionMut, WriteTxn};

use crate::model::Document;

/// Root map for document-level fields
pub const META: &str = "meta";
/// Key of the title inside [`META`]
pub const TITLE: &str = "title";

/// Write `document` into the replicated state
pub fn encode(txn: &mut TransactionMut<'_>, document: &Document) {
    let meta = txn.get_or_insert_map(META);
    let title = Any::String(Arc::from(document.title.as_str()));
    if value::out_any(meta.get(&*txn, TITLE)).as_ref() != Some(&title) {
        meta.insert(txn, TITLE, title);
    }

    encode_blocks(txn, &document.blocks);
    encode_comments(txn, &document.comments);
}

/// Project the replicated state into a document
pub fn decode<T: ReadTxn>(txn: &T) -> Document {
    let title = txn
        .get_map(META)
        .and_then(|meta| value::out_any(meta.get(txn, TITLE)))
        .as_ref()
        .and_then(value::any_str)
        .unwrap_or_default()
        .to_string();

    Document {
        title,
        blocks: decode_blocks(txn),
        comments: decode_comments(txn),
    }
}

/// Order lists an encode of `document` will touch
pub fn order_keys(document: &Document) -> Vec<String> {
    blocks::order_keys(&document.blocks)
}
