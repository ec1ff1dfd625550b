//! Node ID validation.

use super::error::{GateError, GateResult};

/// Longest node ID accepted.
pub const MAX_NODE_ID_LEN: usize = 64;

/// Validate a user-supplied node ID, returning it without surrounding whitespace.
///
/// Accepted: 1-64 characters from `[A-Za-z0-9_-]`.
pub fn validate_node_id(raw: &str) -> GateResult<&str> {
    let node_id = raw.trim();

    let well_formed = !node_id.is_empty()
        && node_id.len() <= MAX_NODE_ID_LEN
        && node_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if well_formed {
        Ok(node_id)
    } else {
        Err(GateError::InvalidFormat(raw.to_string()))
    }
}
