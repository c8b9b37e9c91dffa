use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::compare::{Comparator, ComparisonError, SimilarityVerdict};
use crate::core::decode::{self, DecodeError, DecodeLimits, PixelGrid};
use crate::core::fingerprint::{
    ExtractionError, Extractor, Fingerprint, GradientConfig, IconConfig, Strategy,
};

/// Which of the two submitted images an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageSlot {
    First,
    Second,
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSlot::First => f.write_str("image1"),
            ImageSlot::Second => f.write_str("image2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Extraction,
    Comparison,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{image}: {source}")]
    Decode {
        image: ImageSlot,
        #[source]
        source: DecodeError,
    },

    #[error("{image}: {source}")]
    Extraction {
        image: ImageSlot,
        #[source]
        source: ExtractionError,
    },

    #[error(transparent)]
    Comparison(#[from] ComparisonError),
}

/// Failure to fingerprint a lone image, outside any pair.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl EngineError {
    pub fn stage(&self) -> Stage {
        match self {
            EngineError::Decode { .. } => Stage::Decode,
            EngineError::Extraction { .. } => Stage::Extraction,
            EngineError::Comparison(_) => Stage::Comparison,
        }
    }

    pub fn image(&self) -> Option<ImageSlot> {
        match self {
            EngineError::Decode { image, .. } | EngineError::Extraction { image, .. } => {
                Some(*image)
            }
            EngineError::Comparison(_) => None,
        }
    }

    /// Whether the caller's input caused the failure, as opposed to a
    /// configuration problem on our side.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Comparison(_))
    }

    /// Position in the pipeline: decode A, decode B, extract A, extract B, compare.
    fn precedence(&self) -> u8 {
        match (self.stage(), self.image()) {
            (Stage::Decode, Some(ImageSlot::First)) => 0,
            (Stage::Decode, _) => 1,
            (Stage::Extraction, Some(ImageSlot::First)) => 2,
            (Stage::Extraction, _) => 3,
            (Stage::Comparison, _) => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub strategy: Strategy,
    /// Fingerprint both images concurrently.
    pub parallel: bool,
    pub limits: DecodeLimits,
    pub gradient: GradientConfig,
    pub icon: IconConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            parallel: true,
            limits: DecodeLimits::default(),
            gradient: GradientConfig::default(),
            icon: IconConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject settings under which every pair would get the same verdict.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        let gradient = &self.gradient;
        if gradient.hash_width == 0 || gradient.hash_height == 0 {
            return invalid("gradient hash dimensions must be non-zero");
        }
        if let Some(tolerance) = gradient.tone_tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return invalid("gradient.tone_tolerance must be a non-negative number");
            }
        }

        let icon = &self.icon;
        if icon.size == 0 {
            return invalid("icon.size must be non-zero");
        }
        if !icon.threshold.is_finite() || icon.threshold <= 0.0 {
            return invalid("icon.threshold must be a positive number");
        }
        for tolerance in [icon.mean_tolerance, icon.spread_tolerance].into_iter().flatten() {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return invalid("icon tolerances must be non-negative numbers");
            }
        }

        Ok(())
    }
}

/// Decodes, fingerprints and compares image pairs. Holds configuration only,
/// so one instance can serve any number of concurrent callers.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    config: EngineConfig,
    extractor: Extractor,
    comparator: Comparator,
}

impl SimilarityEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(config))
    }

    fn assemble(config: EngineConfig) -> Self {
        Self {
            extractor: Extractor::new(config.strategy, config.gradient, config.icon),
            comparator: Comparator::new(config.gradient, config.icon),
            config,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.extractor.strategy()
    }

    pub fn is_similar(&self, first: &[u8], second: &[u8]) -> Result<bool, EngineError> {
        self.compare(first, second).map(|verdict| verdict.similar)
    }

    pub fn compare(&self, first: &[u8], second: &[u8]) -> Result<SimilarityVerdict, EngineError> {
        let (a, b) = if self.config.parallel {
            let results = rayon::join(
                || self.fingerprint_slot(first, ImageSlot::First),
                || self.fingerprint_slot(second, ImageSlot::Second),
            );
            match results {
                (Ok(a), Ok(b)) => (a, b),
                (Err(a), Err(b)) if b.precedence() < a.precedence() => return Err(b),
                (Err(err), _) | (_, Err(err)) => return Err(err),
            }
        } else {
            self.fingerprint_sequential(first, second)?
        };

        Ok(self.comparator.compare(&a, &b)?)
    }

    /// Decode and fingerprint a single image.
    pub fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint, FingerprintError> {
        let grid = decode::decode(bytes, &self.config.limits)?;
        Ok(self.extractor.extract(&grid)?)
    }

    fn fingerprint_sequential(
        &self,
        first: &[u8],
        second: &[u8],
    ) -> Result<(Fingerprint, Fingerprint), EngineError> {
        let grid_a = self.decode(first, ImageSlot::First)?;
        let grid_b = self.decode(second, ImageSlot::Second)?;

        let a = self.extract(&grid_a, ImageSlot::First)?;
        drop(grid_a);
        let b = self.extract(&grid_b, ImageSlot::Second)?;
        Ok((a, b))
    }

    fn fingerprint_slot(&self, bytes: &[u8], image: ImageSlot) -> Result<Fingerprint, EngineError> {
        let grid = self.decode(bytes, image)?;
        self.extract(&grid, image)
    }

    fn decode(&self, bytes: &[u8], image: ImageSlot) -> Result<PixelGrid, EngineError> {
        decode::decode(bytes, &self.config.limits)
            .map_err(|source| EngineError::Decode { image, source })
    }

    fn extract(&self, grid: &PixelGrid, image: ImageSlot) -> Result<Fingerprint, EngineError> {
        self.extractor
            .extract(grid)
            .map_err(|source| EngineError::Extraction { image, source })
    }
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::assemble(EngineConfig::default())
    }
}
