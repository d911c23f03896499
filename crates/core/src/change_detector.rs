//! Order-independent change detection for gift snapshots.
//!
//! The digest is a SHA-256 over a canonical JSON serialization: gifts sorted
//! by id, lock maps keyed in ascending account order (guaranteed by
//! [`GiftLocks`](crate::gift::GiftLocks) being a `BTreeMap`). Two snapshots
//! that differ only in gift order or lock insertion order hash identically;
//! any field difference yields a different digest.

use crate::gift::Gift;
use crate::hashing::DigestWriter;

/// Compute the canonical content digest of a set of gifts.
pub fn digest(gifts: &[Gift]) -> String {
    let mut canonical: Vec<&Gift> = gifts.iter().collect();
    canonical.sort_by(|a, b| a.id.cmp(&b.id));

    let mut writer = DigestWriter::new();
    // Gift holds only plain data with integer map keys; serializing into an
    // infallible sink cannot fail.
    let _ = serde_json::to_writer(&mut writer, &canonical);
    writer.finish_hex()
}

/// `true` when `next` differs from the last published digest.
///
/// A missing previous digest (nothing published yet) always counts as a
/// change.
pub fn has_changed(previous: Option<&str>, next: &str) -> bool {
    previous != Some(next)
}
