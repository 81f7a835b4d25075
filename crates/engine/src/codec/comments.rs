//! Comment thread encoding
//!
//! Comments live in the root map `comments`, one nested map per comment id.
//! Each comment keeps its replies in a nested `replies` map keyed by reply id.

use std::collections::HashSet;
use std::sync::Arc;

use blocksync_protocol::Caret;
use yrs::{Any, Map, MapPrelim, MapRef, Out, ReadTxn, TransactionMut, WriteTxn};

use super::value::{any_i64, any_str, any_to_json, json_to_any, out_any};
use crate::model::{Comment, Reply};

/// Root map holding every comment thread
pub const COMMENTS: &str = "comments";

const ID: &str = "id";
const KIND: &str = "type";
const CONTENT: &str = "content";
const CREATED_AT: &str = "createdAt";
const STATUS: &str = "status";
const START: &str = "start";
const END: &str = "end";
const AUTHOR_ID: &str = "authorId";
const AUTHOR_NAME: &str = "authorName";
const REPLIES: &str = "replies";

fn text(value: &str) -> Any {
    Any::String(Arc::from(value))
}

fn caret(value: Option<&Caret>) -> Option<Any> {
    let caret = value?;
    match serde_json::to_value(caret) {
        Ok(json) => Some(json_to_any(&json)),
        Err(e) => {
            tracing::warn!(error = %e, block = %caret.block_id, "caret not stored");
            None
        }
    }
}

/// Write one field unless the stored value is already equal
///
/// `None` removes the field.
fn write_field(txn: &mut TransactionMut<'_>, map: &MapRef, key: &str, value: Option<Any>) {
    let stored = out_any(map.get(&*txn, key));
    if stored == value {
        return;
    }
    match value {
        Some(value) => {
            map.insert(txn, key, value);
        }
        None => {
            map.remove(txn, key);
        }
    }
}

/// Nested map under `key`, created when missing or of another type
fn nested_map(txn: &mut TransactionMut<'_>, parent: &MapRef, key: &str) -> MapRef {
    if let Some(Out::YMap(map)) = parent.get(&*txn, key) {
        return map;
    }
    parent.insert(txn, key, MapPrelim::default())
}

/// Delete entries whose key is not in `keep`
fn remove_stale(txn: &mut TransactionMut<'_>, map: &MapRef, keep: &HashSet<&str>) {
    let stale: Vec<String> = map
        .keys(&*txn)
        .filter(|key| !keep.contains(key))
        .map(String::from)
        .collect();
    for key in stale {
        map.remove(txn, &key);
    }
}

pub fn encode_comments(txn: &mut TransactionMut<'_>, comments: &[Comment]) {
    let root = txn.get_or_insert_map(COMMENTS);
    let keep: HashSet<&str> = comments.iter().map(|c| c.id.as_str()).collect();
    remove_stale(txn, &root, &keep);

    for comment in comments {
        let map = nested_map(txn, &root, &comment.id);
        write_field(txn, &map, ID, Some(text(&comment.id)));
        write_field(txn, &map, KIND, Some(text(&comment.kind)));
        write_field(txn, &map, CONTENT, Some(text(&comment.content)));
        write_field(txn, &map, CREATED_AT, Some(Any::BigInt(comment.created_at)));
        write_field(txn, &map, STATUS, Some(text(&comment.status)));
        write_field(txn, &map, START, caret(comment.start.as_ref()));
        write_field(txn, &map, END, caret(comment.end.as_ref()));
        write_field(txn, &map, AUTHOR_ID, Some(text(&comment.author_id)));
        write_field(txn, &map, AUTHOR_NAME, Some(text(&comment.author_name)));
        encode_replies(txn, &map, &comment.replies);
    }
}

fn encode_replies(txn: &mut TransactionMut<'_>, comment: &MapRef, replies: &[Reply]) {
    let map = nested_map(txn, comment, REPLIES);
    let keep: HashSet<&str> = replies.iter().map(|r| r.id.as_str()).collect();
    remove_stale(txn, &map, &keep);

    for reply in replies {
        let entry = nested_map(txn, &map, &reply.id);
        write_field(txn, &entry, ID, Some(text(&reply.id)));
        write_field(txn, &entry, CONTENT, Some(text(&reply.content)));
        write_field(txn, &entry, CREATED_AT, Some(Any::BigInt(reply.created_at)));
        write_field(txn, &entry, AUTHOR_ID, Some(text(&reply.author_id)));
        write_field(txn, &entry, AUTHOR_NAME, Some(text(&reply.author_name)));
    }
}

struct Fields<'a, T: ReadTxn> {
    txn: &'a T,
    map: &'a MapRef,
}

impl<T: ReadTxn> Fields<'_, T> {
    fn string(&self, key: &str) -> String {
        out_any(self.map.get(self.txn, key))
            .as_ref()
            .and_then(any_str)
            .unwrap_or_default()
            .to_string()
    }

    fn timestamp(&self, key: &str) -> i64 {
        out_any(self.map.get(self.txn, key))
            .as_ref()
            .and_then(any_i64)
            .unwrap_or_default()
    }

    fn caret(&self, key: &str) -> Option<Caret> {
        let any = out_any(self.map.get(self.txn, key))?;
        serde_json::from_value(any_to_json(&any)).ok()
    }

    fn map(&self, key: &str) -> Option<MapRef> {
        match self.map.get(self.txn, key) {
            Some(Out::YMap(map)) => Some(map),
            _ => None,
        }
    }
}

fn nested_maps<T: ReadTxn>(txn: &T, map: &MapRef) -> Vec<MapRef> {
    map.iter(txn)
        .filter_map(|(_, out)| match out {
            Out::YMap(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Comment threads ordered by creation time, ties broken by id
pub fn decode_comments<T: ReadTxn>(txn: &T) -> Vec<Comment> {
    let Some(root) = txn.get_map(COMMENTS) else {
        return Vec::new();
    };

    let mut comments: Vec<Comment> = nested_maps(txn, &root)
        .iter()
        .map(|map| {
            let fields = Fields { txn, map };
            Comment {
                id: fields.string(ID),
                kind: fields.string(KIND),
                content: fields.string(CONTENT),
                created_at: fields.timestamp(CREATED_AT),
                status: fields.string(STATUS),
                start: fields.caret(START),
                end: fields.caret(END),
                author_id: fields.string(AUTHOR_ID),
                author_name: fields.string(AUTHOR_NAME),
                replies: fields
                    .map(REPLIES)
                    .map(|replies| decode_replies(txn, &replies))
                    .unwrap_or_default(),
            }
        })
        .collect();
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    comments
}

fn decode_replies<T: ReadTxn>(txn: &T, replies: &MapRef) -> Vec<Reply> {
    let mut replies: Vec<Reply> = nested_maps(txn, replies)
        .iter()
        .map(|map| {
            let fields = Fields { txn, map };
            Reply {
                id: fields.string(ID),
                content: fields.string(CONTENT),
                created_at: fields.timestamp(CREATED_AT),
                author_id: fields.string(AUTHOR_ID),
                author_name: fields.string(AUTHOR_NAME),
            }
        })
        .collect();
    replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    replies
}
