use image::RgbImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconConfig {
    /// Icon edge length in cells.
    pub size: u32,
    /// Mean squared per-sample difference below which two icons match.
    pub threshold: f32,
    /// Largest per-channel gap between icon means before a pair is
    /// rejected without computing the full distance.
    pub mean_tolerance: Option<f32>,
    /// Same as `mean_tolerance`, for the per-channel standard deviation.
    pub spread_tolerance: Option<f32>,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            size: 8,
            threshold: 100.0,
            mean_tolerance: Some(48.0),
            spread_tolerance: Some(48.0),
        }
    }
}

/// Small area-averaged RGB thumbnail with per-channel summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconFingerprint {
    size: u32,
    cells: Vec<[f32; 3]>,
    mean: [f32; 3],
    variance: [f32; 3],
}

impl IconFingerprint {
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Row-major averaged samples, `size * size` entries.
    pub fn cells(&self) -> &[[f32; 3]] {
        &self.cells
    }

    pub fn mean(&self) -> [f32; 3] {
        self.mean
    }

    pub fn variance(&self) -> [f32; 3] {
        self.variance
    }

    /// Sum of squared per-channel differences divided by the sample count.
    pub fn mean_squared_distance(&self, other: &Self) -> f32 {
        let samples = (self.cells.len() * 3).max(1) as f32;
        let sum: f32 = self
            .cells
            .iter()
            .zip(other.cells.iter())
            .flat_map(|(a, b)| a.iter().zip(b.iter()))
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        sum / samples
    }

    pub fn mean_gap(&self, other: &Self) -> f32 {
        max_channel_gap(self.mean, other.mean)
    }

    pub fn spread_gap(&self, other: &Self) -> f32 {
        max_channel_gap(
            self.variance.map(f32::sqrt),
            other.variance.map(f32::sqrt),
        )
    }
}

fn max_channel_gap(a: [f32; 3], b: [f32; 3]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f32::max)
}

#[derive(Debug, Clone)]
pub struct IconExtractor {
    config: IconConfig,
}

impl IconExtractor {
    pub fn new(config: IconConfig) -> Self {
        Self { config }
    }

    pub(super) fn extract(&self, rgb: &RgbImage) -> IconFingerprint {
        let cells = area_average(rgb, self.config.size);

        let count = cells.len().max(1) as f32;
        let mut mean = [0.0f32; 3];
        for cell in &cells {
            for c in 0..3 {
                mean[c] += cell[c];
            }
        }
        mean = mean.map(|sum| sum / count);

        let mut variance = [0.0f32; 3];
        for cell in &cells {
            for c in 0..3 {
                let d = cell[c] - mean[c];
                variance[c] += d * d;
            }
        }
        variance = variance.map(|sum| sum / count);

        IconFingerprint {
            size: self.config.size,
            cells,
            mean,
            variance,
        }
    }
}

/// Column or row span `[start, end)` covered by output cell `index` out of
/// `cells`. Never empty as long as `len > 0`.
fn span(index: u32, cells: u32, len: u32) -> (u32, u32) {
    let start = (index as u64 * len as u64 / cells as u64) as u32;
    let end = ((index as u64 + 1) * len as u64 / cells as u64) as u32;
    (start, end.max(start + 1).min(len))
}

/// Reduce `rgb` to `size x size` cells, each the plain mean of the source
/// pixels it covers.
fn area_average(rgb: &RgbImage, size: u32) -> Vec<[f32; 3]> {
    let (width, height) = rgb.dimensions();
    let mut cells = Vec::with_capacity((size * size) as usize);

    for cy in 0..size {
        let (y0, y1) = span(cy, size, height);
        for cx in 0..size {
            let (x0, x1) = span(cx, size, width);

            let mut sum = [0u64; 3];
            for y in y0..y1 {
                for x in x0..x1 {
                    let px = rgb.get_pixel(x, y);
                    for c in 0..3 {
                        sum[c] += px[c] as u64;
                    }
                }
            }

            let n = ((x1 - x0) as u64 * (y1 - y0) as u64) as f32;
            cells.push(sum.map(|s| s as f32 / n));
        }
    }

    cells
}
