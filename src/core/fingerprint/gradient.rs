//! Difference-hash fingerprint.
//!
//! The image is resampled to `(hash_width + 1) x hash_height` luma samples and
//! every horizontally adjacent pair contributes one bit (set when the left
//! sample is darker than the right one). Rows are concatenated top to bottom.

use image::RgbImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize};

use super::mean_rgb;
use crate::core::decode::PixelGrid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientConfig {
    pub hash_width: u32,
    pub hash_height: u32,
    /// Largest Hamming distance still reported as similar. Zero keeps the
    /// strict rule: only identical bit sequences match.
    pub max_distance: u32,
    /// Largest per-channel gap between the colour casts of the two images
    /// (mean colour minus its own grey level) still reported as similar.
    /// `None` compares the bit sequences alone.
    pub tone_tolerance: Option<f32>,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            hash_width: 8,
            hash_height: 8,
            max_distance: 0,
            tone_tolerance: Some(64.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientFingerprint {
    hash_width: u32,
    hash_height: u32,
    hash: ImageHash,
    tone: [f32; 3],
}

impl GradientFingerprint {
    pub fn hash_width(&self) -> u32 {
        self.hash_width
    }

    pub fn hash_height(&self) -> u32 {
        self.hash_height
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.hash.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.as_bytes().iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Mean RGB of the source image.
    pub fn tone(&self) -> [f32; 3] {
        self.tone
    }

    pub fn hamming(&self, other: &Self) -> u32 {
        self.hash.dist(&other.hash)
    }

    /// Largest per-channel difference between the two colour casts. A uniform
    /// brightness shift moves every channel equally and leaves this at zero.
    pub fn tone_gap(&self, other: &Self) -> f32 {
        let (a, b) = (cast(self.tone), cast(other.tone));
        a.iter()
            .zip(b.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }
}

/// Mean colour with its grey level removed.
fn cast(tone: [f32; 3]) -> [f32; 3] {
    let grey = tone.iter().sum::<f32>() / 3.0;
    tone.map(|c| c - grey)
}

#[derive(Debug, Clone)]
pub struct GradientExtractor {
    config: GradientConfig,
}

impl GradientExtractor {
    pub fn new(config: GradientConfig) -> Self {
        Self { config }
    }

    pub(super) fn extract(&self, grid: &PixelGrid, rgb: &RgbImage) -> GradientFingerprint {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient)
            .hash_size(self.config.hash_width, self.config.hash_height)
            .to_hasher();

        GradientFingerprint {
            hash_width: self.config.hash_width,
            hash_height: self.config.hash_height,
            hash: hasher.hash_image(grid.image()),
            tone: mean_rgb(rgb),
        }
    }
}
