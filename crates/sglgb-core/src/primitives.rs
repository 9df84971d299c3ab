//! # Engine Primitives
//!
//! Hardcoded constants for the assessment engine. These are compiled into
//! the binary; runtime-tunable values live in the app configuration.

/// Magic bytes for the exported indicator bundle header.
///
/// - File Header = Magic Bytes ("SGLB") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"SGLB";

/// Current bundle format version.
///
/// Increment this when making breaking changes to the bundle layout.
pub const FORMAT_VERSION: u8 = 1;

/// Number of rework cycles an assessment may go through.
///
/// An assessor may return a submission to the BLGU exactly once; after
/// resubmission the assessor must forward it to validation.
pub const MAX_REWORK_CYCLES: u8 = 1;

/// Default lifetime of a draft lock, in minutes.
///
/// A lock that is not refreshed within this window may be taken over.
pub const DEFAULT_LOCK_TTL_MINUTES: i64 = 30;

/// Longest configurable draft lock, one week.
pub const MAX_LOCK_TTL_MINUTES: i64 = 7 * 24 * 60;

/// Maximum depth of an indicator tree (root = depth 1).
pub const MAX_TREE_DEPTH: usize = 6;

/// Maximum number of nodes in a single indicator tree.
pub const MAX_TREE_NODES: usize = 2000;

/// Maximum number of fields in one form schema.
pub const MAX_FORM_FIELDS: usize = 200;

/// Maximum nesting of `and_all` / `or_any` calculation rules.
///
/// Evaluation is recursive; this bounds the stack.
pub const MAX_RULE_DEPTH: usize = 8;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for field identifiers.
pub const MAX_FIELD_ID_LENGTH: usize = 64;

/// Maximum length for a text response value (64KB).
pub const MAX_TEXT_RESPONSE_LENGTH: usize = 65536;

/// Maximum length for indicator names.
pub const MAX_NAME_LENGTH: usize = 500;

/// Default upper bound for a single MOV file (50 MB).
pub const DEFAULT_MAX_MOV_BYTES: u64 = 50 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rework_cycle() {
        assert_eq!(MAX_REWORK_CYCLES, 1);
    }

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"SGLB");
    }
}
