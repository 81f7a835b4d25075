//! Prefix/suffix sequence diff
//!
//! Computes one contiguous remove/insert that turns an old id sequence into
//! a new one. Only the common prefix and suffix are preserved, so the edit
//! is not a minimal edit script; order lists hold unique ids and edits are
//! usually a single insertion, deletion or move.

/// A contiguous replacement: remove `remove_count` items at `index`, then
/// insert `insert` at the same position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit<T> {
    pub index: usize,
    pub remove_count: usize,
    pub insert: Vec<T>,
}

impl<T: Clone> Edit<T> {
    pub fn is_noop(&self) -> bool {
        self.remove_count == 0 && self.insert.is_empty()
    }

    /// Apply the edit to `seq` in place
    pub fn apply(&self, seq: &mut Vec<T>) {
        seq.splice(
            self.index..self.index + self.remove_count,
            self.insert.iter().cloned(),
        );
    }
}

/// Compute the edit turning `old` into `new`
pub fn compute_edit<T: PartialEq + Clone>(old: &[T], new: &[T]) -> Edit<T> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();

    // The suffix may not overlap the prefix in either sequence.
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    Edit {
        index: prefix,
        remove_count: old.len() - prefix - suffix,
        insert: new[prefix..new.len() - suffix].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn identical_sequences() {
        let edit = compute_edit(&ids("a b c"), &ids("a b c"));
        assert!(edit.is_noop());
        assert_eq!(edit.index, 3);
    }

    #[test]
    fn empty_inputs() {
        let edit = compute_edit::<String>(&[], &[]);
        assert!(edit.is_noop());
        assert_eq!(edit.index, 0);

        let edit = compute_edit(&[], &ids("a b"));
        assert_eq!(edit.remove_count, 0);
        assert_eq!(edit.insert, ids("a b"));

        let edit = compute_edit(&ids("a b"), &[]);
        assert_eq!(edit.remove_count, 2);
        assert!(edit.insert.is_empty());
    }

    #[test]
    fn insertion_in_the_middle() {
        let edit = compute_edit(&ids("a b d"), &ids("a b c d"));
        assert_eq!(
            edit,
            Edit {
                index: 2,
                remove_count: 0,
                insert: ids("c"),
            }
        );
    }

    #[test]
    fn deletion_at_the_end() {
        let edit = compute_edit(&ids("a b c"), &ids("a b"));
        assert_eq!(edit.index, 2);
        assert_eq!(edit.remove_count, 1);
        assert!(edit.insert.is_empty());
    }

    #[test]
    fn rotation_replaces_the_whole_range() {
        // No common prefix (b1 != b2) and no common suffix (b3 != b1).
        let edit = compute_edit(&ids("b1 b2 b3"), &ids("b2 b3 b1"));
        assert_eq!(
            edit,
            Edit {
                index: 0,
                remove_count: 3,
                insert: ids("b2 b3 b1"),
            }
        );
    }

    #[test]
    fn move_to_front_keeps_suffix() {
        let edit = compute_edit(&ids("a b c d"), &ids("c a b d"));
        assert_eq!(edit.index, 0);
        assert_eq!(edit.remove_count, 3);
        assert_eq!(edit.insert, ids("c a b"));
    }

    #[test]
    fn prefix_and_suffix_do_not_overlap() {
        let edit = compute_edit(&ids("a a"), &ids("a a a"));
        assert_eq!(edit.index, 2);
        assert_eq!(edit.remove_count, 0);
        assert_eq!(edit.insert, ids("a"));
    }

    proptest! {
        #[test]
        fn applying_the_edit_yields_new(
            old in prop::collection::vec(0u8..6, 0..12),
            new in prop::collection::vec(0u8..6, 0..12),
        ) {
            let edit = compute_edit(&old, &new);
            prop_assert!(edit.index + edit.remove_count <= old.len());

            let mut seq = old.clone();
            edit.apply(&mut seq);
            prop_assert_eq!(seq, new);
        }
    }
}
