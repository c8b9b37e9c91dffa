pub mod gradient;
pub mod icon;

pub use gradient::{GradientConfig, GradientExtractor, GradientFingerprint};
pub use icon::{IconConfig, IconExtractor, IconFingerprint};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::decode::PixelGrid;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot fingerprint a degenerate {width}x{height} image")]
    DegenerateGrid { width: u32, height: u32 },
}

/// Fingerprinting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Difference hash over down-sampled luma.
    #[default]
    Gradient,
    /// Area-averaged colour thumbnail.
    Icon,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Gradient => "gradient",
            Strategy::Icon => "icon",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown strategy '{0}' (expected gradient or icon)")]
pub struct StrategyParseError(pub String);

impl FromStr for Strategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "gradient" | "dhash" => Ok(Strategy::Gradient),
            "icon" => Ok(Strategy::Icon),
            _ => Err(StrategyParseError(lower)),
        }
    }
}

/// Strategy plus the configuration that decides whether two fingerprints
/// are comparable at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FingerprintShape {
    pub strategy: Strategy,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for FingerprintShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}x{})", self.strategy, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fingerprint {
    Gradient(GradientFingerprint),
    Icon(IconFingerprint),
}

impl Fingerprint {
    pub fn strategy(&self) -> Strategy {
        match self {
            Fingerprint::Gradient(_) => Strategy::Gradient,
            Fingerprint::Icon(_) => Strategy::Icon,
        }
    }

    pub fn shape(&self) -> FingerprintShape {
        match self {
            Fingerprint::Gradient(fp) => FingerprintShape {
                strategy: Strategy::Gradient,
                width: fp.hash_width(),
                height: fp.hash_height(),
            },
            Fingerprint::Icon(fp) => FingerprintShape {
                strategy: Strategy::Icon,
                width: fp.size(),
                height: fp.size(),
            },
        }
    }

    pub fn summary(&self) -> FingerprintSummary {
        match self {
            Fingerprint::Gradient(fp) => FingerprintSummary {
                shape: self.shape(),
                hash: Some(fp.to_hex()),
                mean: fp.tone(),
                variance: None,
                cells: None,
            },
            Fingerprint::Icon(fp) => FingerprintSummary {
                shape: self.shape(),
                hash: None,
                mean: fp.mean(),
                variance: Some(fp.variance()),
                cells: Some(fp.cells().to_vec()),
            },
        }
    }
}

/// Serializable view of a fingerprint for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintSummary {
    #[serde(flatten)]
    pub shape: FingerprintShape,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub mean: [f32; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<[f32; 3]>>,
}

#[derive(Debug, Clone)]
pub enum Extractor {
    Gradient(GradientExtractor),
    Icon(IconExtractor),
}

impl Extractor {
    pub fn new(strategy: Strategy, gradient: GradientConfig, icon: IconConfig) -> Self {
        match strategy {
            Strategy::Gradient => Extractor::Gradient(GradientExtractor::new(gradient)),
            Strategy::Icon => Extractor::Icon(IconExtractor::new(icon)),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Extractor::Gradient(_) => Strategy::Gradient,
            Extractor::Icon(_) => Strategy::Icon,
        }
    }

    pub fn extract(&self, grid: &PixelGrid) -> Result<Fingerprint, ExtractionError> {
        if grid.is_degenerate() {
            return Err(ExtractionError::DegenerateGrid {
                width: grid.width(),
                height: grid.height(),
            });
        }

        let rgb = grid.image().to_rgb8();
        let fingerprint = match self {
            Extractor::Gradient(extractor) => {
                Fingerprint::Gradient(extractor.extract(grid, &rgb))
            }
            Extractor::Icon(extractor) => Fingerprint::Icon(extractor.extract(&rgb)),
        };

        log::debug!(
            "extracted {} fingerprint from {}x{} image ({:?})",
            fingerprint.shape(),
            grid.width(),
            grid.height(),
            grid.format()
        );

        Ok(fingerprint)
    }
}

/// Mean of each RGB channel over the whole image.
fn mean_rgb(rgb: &RgbImage) -> [f32; 3] {
    let mut sum = [0u64; 3];
    for px in rgb.pixels() {
        for c in 0..3 {
            sum[c] += px[c] as u64;
        }
    }
    let n = (rgb.width() as u64 * rgb.height() as u64).max(1) as f64;
    sum.map(|s| (s as f64 / n) as f32)
}
