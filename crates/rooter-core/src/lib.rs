//! # rooter-core
//!
//! Core types, traits, and abstractions for rooter.
//!
//! This crate provides the data model (works, manifestations, fingerprints,
//! jobs), the repository and hasher traits that the other rooter crates
//! implement, content-based media type sniffing, and the fixed-width
//! fingerprint hash type used by the matcher.

pub mod defaults;
pub mod error;
pub mod hash;
pub mod logging;
pub mod media;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use hash::{hamming_distance, FingerprintHash};
pub use media::{sniff, sniff_file, MediaType};
pub use models::*;
pub use traits::*;
