//! # rooter-search
//!
//! Approximate matching over fixed-width perceptual hashes.
//!
//! This crate provides:
//! - [`Matcher`]: full scan of a namespace in the fingerprint store, the
//!   ground truth for every search
//! - [`HammingIndex`]: an in-memory multi-index accelerator whose results
//!   always equal the full scan. It is a library-only building block: the
//!   worker and the HTTP server search through [`Matcher`], and nothing in
//!   the workspace builds an index on their behalf. Callers serving many
//!   queries against a stable namespace can build one with
//!   [`HammingIndex::build`] and query it in place of the store.
//!
//! A fingerprint matches when its Hamming distance to the query is strictly
//! below the threshold.

pub mod index;
pub mod matcher;

pub use index::HammingIndex;
pub use matcher::{Matcher, NamespacePolicy, SearchOutcome};
pub use rooter_core::hamming_distance;
