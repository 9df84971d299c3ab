//! # Formats Module
//!
//! Serialization formats that leave the portal: the indicator bundle used
//! to move published indicator sets between deployments.
//!
//! File I/O lives in the app layer; everything here is bytes in, bytes out.

pub mod bundle;

pub use bundle::{
    BundleHeader, IndicatorBundle, MAX_BUNDLE_SIZE, bundle_from_bytes, bundle_to_bytes,
};
