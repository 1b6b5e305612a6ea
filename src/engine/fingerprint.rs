//! Deduplication identity of an incident.

use sha2::{Digest, Sha256};

use crate::models::IncidentEvent;

/// Hex characters of the digest kept after the category prefix.
const DIGEST_HEX_LEN: usize = 16;

/// Derives the fingerprint of `event` from its category and source identity.
///
/// The timestamp, message and details do not participate, so repeats of the
/// same logical incident map to the same value. The category is kept in
/// clear as a namespace prefix: two incidents of different categories can
/// never share a fingerprint.
pub fn fingerprint(event: &IncidentEvent) -> String {
    let category = event.category().as_str();
    let source = event.source();

    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update([0u8]);
    hasher.update(source.location.as_bytes());
    hasher.update([0u8]);
    hasher.update(source.kind.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{category}:{}", &digest[..DIGEST_HEX_LEN])
}
