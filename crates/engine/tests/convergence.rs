mod common;

use blocksync_engine::{Block, ConnectionState, Document, SyncSession};
use common::{doc_of, exchange, outgoing, paragraph, synced_pair};
use proptest::prelude::*;

/// Scenario: the joiner receives the shared document in one round trip
#[test]
fn joiner_receives_shared_document() {
    let initial = Document {
        title: String::new(),
        blocks: vec![paragraph("b1", "Hello")],
        comments: Vec::new(),
    };
    let (a, b) = synced_pair(&initial);

    assert_eq!(b.state(), ConnectionState::On);
    assert_eq!(b.content().blocks, vec![paragraph("b1", "Hello")]);
    assert_eq!(a.content(), b.content());
}

/// Moving a block between parents on one peer never loses it on the other
#[test]
fn move_between_parents_replicates() {
    let moved = paragraph("m", "moving");
    let (mut a, mut b) = synced_pair(&doc_of(vec![
        Block::new("p", "core/group").with_inner_blocks(vec![moved.clone()]),
        Block::new("q", "core/group"),
    ]));

    let target = doc_of(vec![
        Block::new("p", "core/group"),
        Block::new("q", "core/group").with_inner_blocks(vec![moved]),
    ]);
    a.apply_local_change(&target).unwrap();
    exchange(&mut [&mut a, &mut b]);

    assert_eq!(b.content(), target);
}

/// Three peers: a late joiner catches up with everyone's edits
#[test]
fn late_joiner_catches_up() {
    let (mut a, mut b) = synced_pair(&doc_of(vec![paragraph("b1", "one")]));
    a.apply_local_change(&doc_of(vec![paragraph("b1", "one"), paragraph("b2", "two")]))
        .unwrap();
    exchange(&mut [&mut a, &mut b]);

    let mut c = SyncSession::with_identity("peer-c").unwrap();
    c.connect().unwrap();
    exchange(&mut [&mut a, &mut b, &mut c]);

    assert_eq!(c.state(), ConnectionState::On);
    assert_eq!(c.content(), a.content());
    assert_eq!(c.content(), b.content());
}

/// A concurrent delete and attribute edit of the same block converge
#[test]
fn concurrent_delete_and_edit_converge() {
    let (mut a, mut b) = synced_pair(&doc_of(vec![paragraph("b1", "x"), paragraph("b2", "y")]));

    a.apply_local_change(&doc_of(vec![paragraph("b2", "y")])).unwrap();
    b.apply_local_change(&doc_of(vec![paragraph("b1", "edited"), paragraph("b2", "y")]))
        .unwrap();
    exchange(&mut [&mut a, &mut b]);

    assert_eq!(a.content(), b.content());
    assert!(a.content().find_block("b2").is_some());
}

#[derive(Debug, Clone)]
enum Edit {
    Insert { at: usize, text: String },
    Remove { at: usize },
    Retext { at: usize, text: String },
    Move { from: usize, to: usize },
    Nest { at: usize },
    Retitle { title: String },
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..8, "[a-z]{0,5}").prop_map(|(at, text)| Edit::Insert { at, text }),
        (0usize..8).prop_map(|at| Edit::Remove { at }),
        (0usize..8, "[a-z]{0,5}").prop_map(|(at, text)| Edit::Retext { at, text }),
        (0usize..8, 0usize..8).prop_map(|(from, to)| Edit::Move { from, to }),
        (0usize..8).prop_map(|at| Edit::Nest { at }),
        "[a-z]{0,5}".prop_map(|title| Edit::Retitle { title }),
    ]
}

/// Apply `edit` to the top level of `doc`, minting ids from `next_id`
fn apply(doc: &mut Document, edit: &Edit, author: &str, next_id: &mut usize) {
    let blocks = &mut doc.blocks;
    let len = blocks.len();
    match edit {
        Edit::Insert { at, text } => {
            let id = format!("{author}{next_id}");
            *next_id += 1;
            blocks.insert(at % (len + 1), paragraph(&id, text));
        }
        Edit::Remove { at } if len > 0 => {
            blocks.remove(at % len);
        }
        Edit::Retext { at, text } if len > 0 => {
            blocks[at % len]
                .attributes
                .insert("content".to_string(), text.clone().into());
        }
        Edit::Move { from, to } if len > 0 => {
            let block = blocks.remove(from % len);
            blocks.insert(to % len, block);
        }
        Edit::Nest { at } if len > 1 => {
            let index = at % (len - 1) + 1;
            let block = blocks.remove(index);
            blocks[index - 1].inner_blocks.push(block);
        }
        Edit::Retitle { title } => doc.title.clone_from(title),
        _ => {}
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any interleaving of edits and partial deliveries converges
    #[test]
    fn replicas_converge(
        steps in prop::collection::vec((any::<bool>(), arb_edit(), any::<bool>()), 1..24)
    ) {
        let (mut a, mut b) = synced_pair(&doc_of(vec![paragraph("seed", "")]));
        let mut to_b = Vec::new();
        let mut to_a = Vec::new();
        let mut next_id = 0;

        for (on_a, edit, deliver) in &steps {
            let (session, author, queue) = if *on_a {
                (&mut a, "a", &mut to_b)
            } else {
                (&mut b, "b", &mut to_a)
            };
            let mut content = session.content();
            apply(&mut content, edit, author, &mut next_id);
            session.apply_local_change(&content).unwrap();
            queue.extend(outgoing(session));

            if *deliver {
                for message in to_b.drain(..) {
                    b.receive(&message).unwrap();
                }
                for message in to_a.drain(..) {
                    a.receive(&message).unwrap();
                }
                to_a.extend(outgoing(&mut b));
                to_b.extend(outgoing(&mut a));
            }
        }

        for message in to_b.drain(..) {
            b.receive(&message).unwrap();
        }
        for message in to_a.drain(..) {
            a.receive(&message).unwrap();
        }
        exchange(&mut [&mut a, &mut b]);

        prop_assert_eq!(a.content(), b.content());
    }
}
