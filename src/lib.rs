//! Decide whether two PNG/JPEG images are visually similar.

pub mod config;
pub mod core;
pub mod server;

pub use config::{Config, ConfigError};
pub use crate::core::compare::{Comparator, ComparisonError, Distance, SimilarityVerdict};
pub use crate::core::decode::{DecodeError, DecodeLimits, PixelGrid, decode};
pub use crate::core::engine::{
    EngineConfig, EngineError, FingerprintError, ImageSlot, SimilarityEngine, Stage,
};
pub use crate::core::fingerprint::{
    ExtractionError, Extractor, Fingerprint, FingerprintShape, FingerprintSummary,
    GradientConfig, IconConfig, Strategy,
};
