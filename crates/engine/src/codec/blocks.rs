//! Block tree encoding
//!
//! A nested block tree is flattened into one order list per parent (a
//! root-level array named `order/<parent-id>`, the empty id being the
//! document root) and a shared `blocks` map from block id to the block's
//! name and attributes. Children are reachable only through order lists.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use yrs::{Any, Array, ArrayRef, Map, MapRef, Out, ReadTxn, TransactionMut, WriteTxn};

use super::value::{any_str, any_to_object, object_to_any};
use crate::diff::compute_edit;
use crate::model::Block;

/// Content-by-id map
pub const BLOCKS: &str = "blocks";
/// Prefix of every order list name
pub const ORDER_PREFIX: &str = "order/";
/// Parent key of top-level blocks
pub const ROOT_PARENT: &str = "";

const NAME: &str = "name";
const ATTRIBUTES: &str = "attributes";

/// Name of the order list holding the children of `parent_id`
pub fn order_key(parent_id: &str) -> String {
    format!("{ORDER_PREFIX}{parent_id}")
}

/// Every order list an encode of `blocks` touches, root first
pub fn order_keys(blocks: &[Block]) -> Vec<String> {
    fn walk(blocks: &[Block], keys: &mut Vec<String>) {
        for block in blocks {
            keys.push(order_key(&block.id));
            walk(&block.inner_blocks, keys);
        }
    }
    let mut keys = vec![order_key(ROOT_PARENT)];
    walk(blocks, &mut keys);
    keys
}

/// Order lists currently reachable from the root, whether or not their
/// blocks still have content
///
/// These are the lists an encode may write to when it deletes or moves
/// blocks of the stored tree.
pub fn stored_order_keys<T: ReadTxn>(txn: &T) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut keys = Vec::new();
    let mut pending = vec![ROOT_PARENT.to_string()];
    while let Some(parent_id) = pending.pop() {
        if !visited.insert(parent_id.clone()) {
            continue;
        }
        let key = order_key(&parent_id);
        let Some(order) = txn.get_array(key.as_str()) else {
            continue;
        };
        pending.extend(read_ids(txn, &order));
        keys.push(key);
    }
    keys
}

fn collect_ids<'a>(blocks: &'a [Block], ids: &mut HashSet<&'a str>) {
    for block in blocks {
        ids.insert(block.id.as_str());
        collect_ids(&block.inner_blocks, ids);
    }
}

fn read_ids<T: ReadTxn>(txn: &T, order: &ArrayRef) -> Vec<String> {
    order
        .iter(txn)
        .filter_map(|out| match out {
            Out::Any(Any::String(id)) => Some(id.to_string()),
            _ => None,
        })
        .collect()
}

/// Child ids of one level; repeated ids keep their first position
fn child_ids(parent_id: &str, children: &[Block]) -> Vec<String> {
    let mut seen = HashSet::new();
    children
        .iter()
        .filter(|block| {
            let fresh = seen.insert(block.id.as_str());
            if !fresh {
                tracing::warn!(parent = %parent_id, id = %block.id, "duplicate block id ignored");
            }
            fresh
        })
        .map(|block| block.id.clone())
        .collect()
}

fn block_entry(block: &Block) -> Any {
    let entry = HashMap::from([
        (NAME.to_string(), Any::String(Arc::from(block.name.as_str()))),
        (ATTRIBUTES.to_string(), object_to_any(&block.attributes)),
    ]);
    Any::Map(Arc::new(entry))
}

/// Reconcile the replicated tree with `blocks`
///
/// Only differences are written: order lists receive one contiguous
/// remove/insert per level and content entries are rewritten only when
/// their value changed.
pub fn encode_blocks(txn: &mut TransactionMut<'_>, blocks: &[Block]) {
    let mut live = HashSet::new();
    collect_ids(blocks, &mut live);

    let content = txn.get_or_insert_map(BLOCKS);
    encode_level(txn, &content, ROOT_PARENT, blocks, &live);
}

#[allow(clippy::cast_possible_truncation)]
fn encode_level(
    txn: &mut TransactionMut<'_>,
    content: &MapRef,
    parent_id: &str,
    children: &[Block],
    live: &HashSet<&str>,
) {
    let order = txn.get_or_insert_array(order_key(parent_id));
    let current = read_ids(&*txn, &order);
    let next = child_ids(parent_id, children);
    let edit = compute_edit(&current, &next);

    if !edit.is_noop() {
        // Ids still present elsewhere in the new tree were moved, not deleted.
        for removed in &current[edit.index..edit.index + edit.remove_count] {
            if !live.contains(removed.as_str()) {
                purge(txn, content, removed, live);
            }
        }
        if edit.remove_count > 0 {
            order.remove_range(txn, edit.index as u32, edit.remove_count as u32);
        }
        if !edit.insert.is_empty() {
            order.insert_range(txn, edit.index as u32, edit.insert);
        }
    }

    let mut seen = HashSet::new();
    for block in children {
        if !seen.insert(block.id.as_str()) {
            continue;
        }
        let entry = block_entry(block);
        let unchanged = matches!(content.get(&*txn, &block.id), Some(Out::Any(stored)) if stored == entry);
        if !unchanged {
            content.insert(txn, block.id.as_str(), entry);
        }
        encode_level(txn, content, &block.id, &block.inner_blocks, live);
    }
}

/// Remove a deleted block's content and its orphaned subtree
fn purge(txn: &mut TransactionMut<'_>, content: &MapRef, id: &str, live: &HashSet<&str>) {
    content.remove(txn, id);

    let Some(order) = txn.get_array(order_key(id).as_str()) else {
        return;
    };
    let children = read_ids(&*txn, &order);
    if !children.is_empty() {
        let len = order.len(&*txn);
        order.remove_range(txn, 0, len);
    }
    for child in children {
        if !live.contains(child.as_str()) {
            purge(txn, content, &child, live);
        }
    }
}

/// Project the replicated tree back into blocks
///
/// Ids without a content entry are skipped, and an id reachable from more
/// than one order list (concurrent moves) is emitted only at its first
/// position in document order.
pub fn decode_blocks<T: ReadTxn>(txn: &T) -> Vec<Block> {
    let Some(content) = txn.get_map(BLOCKS) else {
        return Vec::new();
    };
    let mut emitted = HashSet::new();
    decode_level(txn, &content, ROOT_PARENT, &mut emitted)
}

fn decode_level<T: ReadTxn>(
    txn: &T,
    content: &MapRef,
    parent_id: &str,
    emitted: &mut HashSet<String>,
) -> Vec<Block> {
    let Some(order) = txn.get_array(order_key(parent_id).as_str()) else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    for id in read_ids(txn, &order) {
        let Some(Out::Any(Any::Map(entry))) = content.get(txn, &id) else {
            continue;
        };
        if !emitted.insert(id.clone()) {
            continue;
        }
        let inner_blocks = decode_level(txn, content, &id, emitted);
        blocks.push(Block {
            name: entry.get(NAME).and_then(any_str).unwrap_or_default().to_string(),
            attributes: entry.get(ATTRIBUTES).map(any_to_object).unwrap_or_default(),
            inner_blocks,
            id,
        });
    }
    blocks
}
