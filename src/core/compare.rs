use serde::Serialize;
use thiserror::Error;

use crate::core::fingerprint::{
    Fingerprint, FingerprintShape, GradientConfig, GradientFingerprint, IconConfig,
    IconFingerprint,
};

#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("cannot compare {left} and {right} fingerprints")]
    KindMismatch {
        left: FingerprintShape,
        right: FingerprintShape,
    },
}

/// The measurement a verdict was decided on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Distance {
    /// Differing bits between two gradient fingerprints.
    Hamming(u32),
    /// Largest per-channel gap between the colour casts of two gradient
    /// fingerprints; reported when the tone guard rejects the pair.
    ToneGap(f32),
    /// Mean squared sample difference between two icons.
    MeanSquared(f32),
    /// Largest per-channel gap between icon means (early rejection).
    MeanGap(f32),
    /// Largest per-channel gap between icon standard deviations (early rejection).
    SpreadGap(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityVerdict {
    pub similar: bool,
    pub distance: Distance,
}

impl SimilarityVerdict {
    fn new(similar: bool, distance: Distance) -> Self {
        Self { similar, distance }
    }
}

/// Applies the per-strategy similarity rule to two fingerprints.
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    gradient: GradientConfig,
    icon: IconConfig,
}

impl Comparator {
    pub fn new(gradient: GradientConfig, icon: IconConfig) -> Self {
        Self { gradient, icon }
    }

    pub fn compare(
        &self,
        a: &Fingerprint,
        b: &Fingerprint,
    ) -> Result<SimilarityVerdict, ComparisonError> {
        if a.shape() != b.shape() {
            return Err(ComparisonError::KindMismatch {
                left: a.shape(),
                right: b.shape(),
            });
        }

        let verdict = match (a, b) {
            (Fingerprint::Gradient(a), Fingerprint::Gradient(b)) => self.compare_gradient(a, b),
            (Fingerprint::Icon(a), Fingerprint::Icon(b)) => self.compare_icon(a, b),
            _ => {
                return Err(ComparisonError::KindMismatch {
                    left: a.shape(),
                    right: b.shape(),
                });
            }
        };

        log::debug!(
            "{} comparison: similar={} distance={:?}",
            a.strategy(),
            verdict.similar,
            verdict.distance
        );

        Ok(verdict)
    }

    fn compare_gradient(
        &self,
        a: &GradientFingerprint,
        b: &GradientFingerprint,
    ) -> SimilarityVerdict {
        if let Some(tolerance) = self.gradient.tone_tolerance {
            let gap = a.tone_gap(b);
            if gap > tolerance {
                return SimilarityVerdict::new(false, Distance::ToneGap(gap));
            }
        }

        let distance = a.hamming(b);
        SimilarityVerdict::new(
            distance <= self.gradient.max_distance,
            Distance::Hamming(distance),
        )
    }

    fn compare_icon(&self, a: &IconFingerprint, b: &IconFingerprint) -> SimilarityVerdict {
        if let Some(tolerance) = self.icon.mean_tolerance {
            let gap = a.mean_gap(b);
            if gap > tolerance {
                return SimilarityVerdict::new(false, Distance::MeanGap(gap));
            }
        }

        if let Some(tolerance) = self.icon.spread_tolerance {
            let gap = a.spread_gap(b);
            if gap > tolerance {
                return SimilarityVerdict::new(false, Distance::SpreadGap(gap));
            }
        }

        let distance = a.mean_squared_distance(b);
        SimilarityVerdict::new(
            distance < self.icon.threshold,
            Distance::MeanSquared(distance),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decode::PixelGrid;
    use crate::core::fingerprint::{Extractor, Strategy};
    use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};

    fn fingerprint(img: RgbImage, strategy: Strategy) -> Fingerprint {
        fingerprint_with(img, strategy, GradientConfig::default(), IconConfig::default())
    }

    fn fingerprint_with(
        img: RgbImage,
        strategy: Strategy,
        gradient: GradientConfig,
        icon: IconConfig,
    ) -> Fingerprint {
        let grid = PixelGrid::from_image(DynamicImage::ImageRgb8(img));
        Extractor::new(strategy, gradient, icon)
            .extract(&grid)
            .unwrap()
    }

    fn solid(rgb: [u8; 3]) -> RgbImage {
        ImageBuffer::from_pixel(64, 64, Rgb(rgb))
    }

    /// 10x10 blocks alternating between two grey levels, offset by `shift`.
    fn blocks(shift: u8) -> RgbImage {
        ImageBuffer::from_fn(90, 80, |x, y| {
            let v = if ((x / 10) * 3 + y / 10) % 2 == 0 { 60 } else { 140 };
            let v = v + shift;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_mismatched_strategies_fail_fast() {
        let comparator = Comparator::default();
        let gradient = fingerprint(solid([1, 2, 3]), Strategy::Gradient);
        let icon = fingerprint(solid([1, 2, 3]), Strategy::Icon);

        let err = comparator.compare(&gradient, &icon).unwrap_err();
        assert!(matches!(err, ComparisonError::KindMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "cannot compare gradient(8x8) and icon(8x8) fingerprints"
        );
        assert!(comparator.compare(&icon, &gradient).is_err());
    }

    #[test]
    fn test_mismatched_configurations_fail_fast() {
        let comparator = Comparator::default();
        let small = fingerprint_with(
            solid([9, 9, 9]),
            Strategy::Icon,
            GradientConfig::default(),
            IconConfig {
                size: 4,
                ..IconConfig::default()
            },
        );
        let large = fingerprint(solid([9, 9, 9]), Strategy::Icon);

        assert!(matches!(
            comparator.compare(&small, &large),
            Err(ComparisonError::KindMismatch { .. })
        ));

        let wide = fingerprint_with(
            solid([9, 9, 9]),
            Strategy::Gradient,
            GradientConfig {
                hash_width: 16,
                ..GradientConfig::default()
            },
            IconConfig::default(),
        );
        let narrow = fingerprint(solid([9, 9, 9]), Strategy::Gradient);
        assert!(comparator.compare(&wide, &narrow).is_err());
    }

    #[test]
    fn test_gradient_brightness_shift_matches_exactly() {
        let comparator = Comparator::default();
        let original = fingerprint(blocks(0), Strategy::Gradient);

        for shift in [30, 100] {
            let brighter = fingerprint(blocks(shift), Strategy::Gradient);
            let verdict = comparator.compare(&original, &brighter).unwrap();
            assert!(verdict.similar, "shift {shift}: {verdict:?}");
            assert_eq!(verdict.distance, Distance::Hamming(0));
        }

        let dark = fingerprint(solid([20, 20, 20]), Strategy::Gradient);
        let light = fingerprint(solid([220, 220, 220]), Strategy::Gradient);
        assert!(comparator.compare(&dark, &light).unwrap().similar);
    }

    #[test]
    fn test_gradient_tone_guard_separates_flat_colours() {
        let red = fingerprint(solid([255, 0, 0]), Strategy::Gradient);
        let blue = fingerprint(solid([0, 0, 255]), Strategy::Gradient);

        let verdict = Comparator::default().compare(&red, &blue).unwrap();
        assert!(!verdict.similar);
        assert_eq!(verdict.distance, Distance::ToneGap(255.0));

        let bare = Comparator::new(
            GradientConfig {
                tone_tolerance: None,
                ..GradientConfig::default()
            },
            IconConfig::default(),
        );
        let verdict = bare.compare(&red, &blue).unwrap();
        assert!(verdict.similar);
        assert_eq!(verdict.distance, Distance::Hamming(0));
    }

    #[test]
    fn test_gradient_max_distance_allows_near_duplicates() {
        let mut tweaked = blocks(0);
        // Flip the brightness order of a single block pair in the first row.
        for y in 0..10 {
            for x in 0..10 {
                tweaked.put_pixel(x, y, Rgb([180, 180, 180]));
            }
        }

        let a = fingerprint(blocks(0), Strategy::Gradient);
        let b = fingerprint(tweaked, Strategy::Gradient);

        let strict = Comparator::default().compare(&a, &b).unwrap();
        assert!(!strict.similar);
        let Distance::Hamming(bits) = strict.distance else {
            panic!("expected a Hamming distance, got {:?}", strict.distance);
        };
        assert!(bits > 0);

        let lenient = Comparator::new(
            GradientConfig {
                max_distance: bits,
                ..GradientConfig::default()
            },
            IconConfig::default(),
        );
        assert!(lenient.compare(&a, &b).unwrap().similar);
    }

    #[test]
    fn test_icon_rejects_distinct_colours_early() {
        let red = fingerprint(solid([255, 0, 0]), Strategy::Icon);
        let blue = fingerprint(solid([0, 0, 255]), Strategy::Icon);

        let verdict = Comparator::default().compare(&red, &blue).unwrap();
        assert!(!verdict.similar);
        assert_eq!(verdict.distance, Distance::MeanGap(255.0));

        let no_guards = Comparator::new(
            GradientConfig::default(),
            IconConfig {
                mean_tolerance: None,
                spread_tolerance: None,
                ..IconConfig::default()
            },
        );
        let verdict = no_guards.compare(&red, &blue).unwrap();
        assert!(!verdict.similar);
        assert!(matches!(verdict.distance, Distance::MeanSquared(d) if d > 40_000.0));
    }

    #[test]
    fn test_icon_threshold_is_strict() {
        let a = fingerprint(solid([100, 100, 100]), Strategy::Icon);
        let b = fingerprint(solid([110, 100, 100]), Strategy::Icon);

        // 10^2 on one channel of three
        let above = Comparator::new(
            GradientConfig::default(),
            IconConfig {
                threshold: 34.0,
                ..IconConfig::default()
            },
        );
        assert!(above.compare(&a, &b).unwrap().similar);

        let below = Comparator::new(
            GradientConfig::default(),
            IconConfig {
                threshold: 33.0,
                ..IconConfig::default()
            },
        );
        assert!(!below.compare(&a, &b).unwrap().similar);
    }

    #[test]
    fn test_verdicts_are_symmetric() {
        let comparator = Comparator::default();
        for strategy in [Strategy::Gradient, Strategy::Icon] {
            let a = fingerprint(blocks(0), strategy);
            let b = fingerprint(blocks(20), strategy);
            let c = fingerprint(solid([30, 200, 90]), strategy);

            for (x, y) in [(&a, &b), (&a, &c), (&b, &c)] {
                assert_eq!(
                    comparator.compare(x, y).unwrap(),
                    comparator.compare(y, x).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_verdict_serializes_distance_kind() {
        let verdict = SimilarityVerdict::new(true, Distance::Hamming(3));
        let json = serde_json::to_value(verdict).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"similar": true, "distance": {"kind": "hamming", "value": 3}})
        );
    }
}
