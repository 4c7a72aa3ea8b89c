//! Property-based tests using proptest
//!
//! These tests verify metadata editing invariants (order preservation,
//! key uniqueness) and the append-only semantics of ssh-key entries using
//! randomized inputs.

use nimbus::{parse_ssh_keys, render_ssh_keys, Metadata, SshKeyEntry};
use proptest::prelude::*;

/// Generate an arbitrary metadata key
fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,14}"
}

/// Generate an arbitrary metadata value (no constraints beyond printable)
fn arb_value() -> impl Strategy<Value = String> {
    "[ -~]{0,30}"
}

/// Generate an arbitrary ssh-key entry. Usernames cannot contain the
/// separator colon; key material can be anything printable without
/// newlines.
fn arb_ssh_entry() -> impl Strategy<Value = SshKeyEntry> {
    ("[a-z][a-z0-9]{0,11}", "[ -9;-~]{1,40}").prop_map(|(username, key)| SshKeyEntry {
        username,
        key,
    })
}

proptest! {
    /// Applying any sequence of sets leaves keys unique.
    #[test]
    fn metadata_set_keeps_keys_unique(
        ops in prop::collection::vec((arb_key(), arb_value()), 0..40)
    ) {
        let mut metadata = Metadata::default();
        for (key, value) in &ops {
            metadata.set(key, value);
        }

        let mut keys: Vec<_> = metadata.items.iter().map(|i| i.key.clone()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), total);
    }

    /// A key keeps its position across rewrites: setting an existing key
    /// replaces the value in place rather than reordering the list.
    #[test]
    fn metadata_set_preserves_first_insertion_order(
        ops in prop::collection::vec((arb_key(), arb_value()), 1..40)
    ) {
        let mut metadata = Metadata::default();
        let mut expected_order: Vec<String> = Vec::new();
        for (key, value) in &ops {
            metadata.set(key, value);
            if !expected_order.contains(key) {
                expected_order.push(key.clone());
            }
        }

        let actual_order: Vec<_> = metadata.items.iter().map(|i| i.key.clone()).collect();
        prop_assert_eq!(actual_order, expected_order);
    }

    /// The last write wins for every key.
    #[test]
    fn metadata_set_last_write_wins(
        key in arb_key(),
        values in prop::collection::vec(arb_value(), 1..10)
    ) {
        let mut metadata = Metadata::default();
        for value in &values {
            metadata.set(&key, value);
        }
        prop_assert_eq!(metadata.get(&key), values.last().map(String::as_str));
    }

    /// Appending an entry extends the parsed list by exactly one, leaving
    /// every earlier line untouched.
    #[test]
    fn ssh_append_is_append_only(
        existing in prop::collection::vec(arb_ssh_entry(), 0..10),
        new_entry in arb_ssh_entry()
    ) {
        let rendered = render_ssh_keys(&existing);
        let mut entries = parse_ssh_keys(&rendered);
        entries.push(new_entry.clone());

        let reparsed = parse_ssh_keys(&render_ssh_keys(&entries));
        prop_assert_eq!(reparsed.len(), existing.len() + 1);
        prop_assert_eq!(&reparsed[existing.len()], &new_entry);
        prop_assert_eq!(&reparsed[..existing.len()], &existing[..]);
    }

    /// No dedup: appending the same user+key twice yields two lines.
    #[test]
    fn ssh_append_never_dedups(entry in arb_ssh_entry()) {
        let entries = vec![entry.clone(), entry.clone()];
        let reparsed = parse_ssh_keys(&render_ssh_keys(&entries));
        prop_assert_eq!(reparsed.len(), 2);
        prop_assert_eq!(&reparsed[0], &reparsed[1]);
    }
}
