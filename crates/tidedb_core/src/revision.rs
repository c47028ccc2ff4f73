//! Revision strings and write-time helpers.
//!
//! Revisions have the shape `"<height>-<hash>"`. The height grows by one on
//! every write so two writers deriving from the same version produce
//! same-height revisions that differ in their content hash, which is what the
//! storage layer's conflict check keys on.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Height of the revision given to a freshly inserted document.
pub const DEFAULT_REVISION_HEIGHT: u64 = 1;

/// Number of hex characters of the content hash kept in a revision string.
const REVISION_HASH_LEN: usize = 16;

/// Parses the height prefix of a revision string.
///
/// Malformed revisions parse as height 0, which makes any write derived from
/// them produce a height-1 revision.
#[must_use]
pub fn revision_height(revision: &str) -> u64 {
    revision
        .split('-')
        .next()
        .and_then(|h| h.parse().ok())
        .unwrap_or(0)
}

/// Computes the revision for a new document state.
///
/// The revision is derived deterministically from the document's own content
/// (payload and deletion flag) plus the revision it was derived from, so
/// recomputing it for the same write always yields the same string.
#[must_use]
pub fn create_revision(
    payload: &serde_json::Value,
    deleted: bool,
    previous: Option<&str>,
) -> String {
    let height = previous.map(revision_height).unwrap_or(0) + 1;

    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hasher.update([u8::from(deleted)]);
    if let Some(previous) = previous {
        hasher.update(previous.as_bytes());
    }
    let digest = hasher.finalize();

    let mut hash = String::with_capacity(REVISION_HASH_LEN);
    for byte in digest.iter().take(REVISION_HASH_LEN / 2) {
        hash.push_str(&format!("{byte:02x}"));
    }
    format!("{height}-{hash}")
}

/// Current wall-clock time in milliseconds since the unix epoch.
///
/// Used as the last-write-time of revisioned documents.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_revision_has_default_height() {
        let rev = create_revision(&serde_json::json!({"a": 1}), false, None);
        assert_eq!(revision_height(&rev), DEFAULT_REVISION_HEIGHT);
    }

    #[test]
    fn height_grows_from_previous() {
        let payload = serde_json::json!({"a": 1});
        let first = create_revision(&payload, false, None);
        let second = create_revision(&payload, false, Some(&first));
        let third = create_revision(&payload, true, Some(&second));
        assert_eq!(revision_height(&second), 2);
        assert_eq!(revision_height(&third), 3);
    }

    #[test]
    fn deterministic_for_same_content() {
        let payload = serde_json::json!({"a": 1, "b": [1, 2]});
        let one = create_revision(&payload, false, Some("3-abc"));
        let two = create_revision(&payload, false, Some("3-abc"));
        assert_eq!(one, two);
    }

    #[test]
    fn differs_on_content_and_deletion() {
        let a = create_revision(&serde_json::json!({"a": 1}), false, None);
        let b = create_revision(&serde_json::json!({"a": 2}), false, None);
        let c = create_revision(&serde_json::json!({"a": 1}), true, None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn malformed_revision_parses_as_zero() {
        assert_eq!(revision_height("not-a-height"), 0);
        assert_eq!(revision_height(""), 0);
    }
}
