//! Perceptual fingerprinting and comparison.
//!
//! Pipeline: bytes → [`decode`] → [`fingerprint`] → [`compare`], orchestrated
//! by [`engine::SimilarityEngine`]. Nothing here performs I/O.

pub mod compare;
pub mod decode;
pub mod engine;
pub mod fingerprint;
