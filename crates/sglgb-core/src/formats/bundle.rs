//! # Indicator Bundle Format
//!
//! Binary envelope around a JSON snapshot of governance areas and
//! published indicators.
//!
//! Layout:
//! - 4 bytes: Magic ("SGLB")
//! - 1 byte: Version
//! - 8 bytes: FNV-1a checksum of the body (little endian)
//! - 1 byte: length of the BLAKE3 hash that follows (0 or 32)
//! - 0 or 32 bytes: BLAKE3 hash of the body (`crypto-hash` feature)
//! - body: JSON-encoded [`IndicatorBundle`]
//!
//! Checksums cover the body bytes exactly as written, so verification never
//! depends on re-serializing.
//!
//! ## Limits
//!
//! Size and header are validated before the body is parsed.

use crate::indicator::{GovernanceArea, Indicator};
use crate::{IndicatorId, PortalError, primitives};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum accepted bundle size (64 MB).
pub const MAX_BUNDLE_SIZE: usize = 64 * 1024 * 1024;

/// Magic + version + checksum + hash length.
const FIXED_HEADER_LEN: usize = 14;

const BLAKE3_LEN: usize = 32;

// =============================================================================
// PAYLOAD
// =============================================================================

/// Snapshot of published indicator definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub exported_at: DateTime<Utc>,
    pub areas: Vec<GovernanceArea>,
    pub indicators: Vec<Indicator>,
}

impl IndicatorBundle {
    #[must_use]
    pub fn new(
        areas: Vec<GovernanceArea>,
        indicators: Vec<Indicator>,
        exported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            exported_at,
            areas,
            indicators,
        }
    }

    /// Referential checks: unique ids, every area and parent present.
    pub fn check(&self) -> Result<(), PortalError> {
        let mut area_ids = BTreeSet::new();
        for area in &self.areas {
            if !area_ids.insert(area.id) {
                return Err(PortalError::SerializationError(format!(
                    "duplicate area {}",
                    area.id
                )));
            }
        }
        let mut ids: BTreeSet<IndicatorId> = BTreeSet::new();
        for ind in &self.indicators {
            if !ids.insert(ind.id) {
                return Err(PortalError::SerializationError(format!(
                    "duplicate indicator {}",
                    ind.id
                )));
            }
        }
        for ind in &self.indicators {
            if !area_ids.contains(&ind.governance_area_id) {
                return Err(PortalError::AreaNotFound(ind.governance_area_id));
            }
            if let Some(parent) = ind.parent_id {
                if !ids.contains(&parent) {
                    return Err(PortalError::IndicatorNotFound(parent));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// HEADER
// =============================================================================

/// FNV-1a over `data`.
#[must_use]
pub fn checksum(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub checksum: u64,
    pub blake3: Option<[u8; BLAKE3_LEN]>,
}

impl BundleHeader {
    /// Header for `body` with the current format version.
    #[must_use]
    pub fn for_body(body: &[u8]) -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
            checksum: checksum(body),
            blake3: body_hash(body),
        }
    }

    pub fn validate(&self) -> Result<(), PortalError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(PortalError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(PortalError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Check `body` against the recorded checksum, and the BLAKE3 hash when
    /// one is present and the feature is enabled.
    pub fn verify(&self, body: &[u8]) -> Result<(), PortalError> {
        if checksum(body) != self.checksum {
            return Err(PortalError::SerializationError(
                "Bundle checksum mismatch".to_string(),
            ));
        }
        if let (Some(expected), Some(actual)) = (self.blake3, body_hash(body)) {
            if expected != actual {
                return Err(PortalError::SerializationError(
                    "Bundle BLAKE3 hash mismatch".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Hex form of the BLAKE3 hash, if any.
    #[must_use]
    pub fn blake3_hex(&self) -> Option<String> {
        self.blake3
            .map(|h| h.iter().map(|b| format!("{:02x}", b)).collect())
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + self.blake3.map_or(0, |_| BLAKE3_LEN)
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(&self.magic);
        bytes.push(self.version);
        bytes.extend_from_slice(&self.checksum.to_le_bytes());
        match &self.blake3 {
            Some(hash) => {
                bytes.push(BLAKE3_LEN as u8);
                bytes.extend_from_slice(hash);
            }
            None => bytes.push(0),
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PortalError> {
        let too_short = || PortalError::SerializationError("Header too short".to_string());
        let fixed = bytes.get(..FIXED_HEADER_LEN).ok_or_else(too_short)?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&fixed[0..4]);
        let mut sum = [0u8; 8];
        sum.copy_from_slice(&fixed[5..13]);

        let blake3 = match fixed[13] as usize {
            0 => None,
            BLAKE3_LEN => {
                let raw = bytes
                    .get(FIXED_HEADER_LEN..FIXED_HEADER_LEN + BLAKE3_LEN)
                    .ok_or_else(too_short)?;
                let mut hash = [0u8; BLAKE3_LEN];
                hash.copy_from_slice(raw);
                Some(hash)
            }
            other => {
                return Err(PortalError::SerializationError(format!(
                    "Unsupported hash length {}",
                    other
                )));
            }
        };

        Ok(Self {
            magic,
            version: fixed[4],
            checksum: u64::from_le_bytes(sum),
            blake3,
        })
    }
}

#[cfg(feature = "crypto-hash")]
fn body_hash(body: &[u8]) -> Option<[u8; BLAKE3_LEN]> {
    Some(*blake3::hash(body).as_bytes())
}

#[cfg(not(feature = "crypto-hash"))]
fn body_hash(_body: &[u8]) -> Option<[u8; BLAKE3_LEN]> {
    None
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a bundle to bytes (header + body).
pub fn bundle_to_bytes(bundle: &IndicatorBundle) -> Result<Vec<u8>, PortalError> {
    let body =
        serde_json::to_vec(bundle).map_err(|e| PortalError::SerializationError(e.to_string()))?;
    let header = BundleHeader::for_body(&body);
    let mut result = header.to_bytes();
    result.extend_from_slice(&body);
    Ok(result)
}

/// Parse and verify a bundle.
///
/// Size, header and checksums are all validated before the body is parsed.
pub fn bundle_from_bytes(bytes: &[u8]) -> Result<(BundleHeader, IndicatorBundle), PortalError> {
    if bytes.len() > MAX_BUNDLE_SIZE {
        return Err(PortalError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_BUNDLE_SIZE
        )));
    }
    let header = BundleHeader::from_bytes(bytes)?;
    header.validate()?;

    let body = bytes
        .get(header.encoded_len()..)
        .ok_or_else(|| PortalError::SerializationError("Missing body".to_string()))?;
    header.verify(body)?;

    let bundle: IndicatorBundle = serde_json::from_slice(body).map_err(|e| {
        PortalError::SerializationError(format!("Failed to parse bundle body: {}", e))
    })?;
    bundle.check()?;
    Ok((header, bundle))
}

// =============================================================================
// TESTS
// =============================================================================
