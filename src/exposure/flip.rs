//! Zero-flip detection
//!
//! Scans a profile in ascending spot order and reports the first strict sign
//! change, linearly interpolated between the two straddling levels. Later
//! crossings are ignored.

use serde::{Deserialize, Serialize};

/// Interpolated zero crossing of a profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlipPoint {
    /// Interpolated spot at which the curve crosses zero
    pub spot: f64,
    /// Index of the lower straddling level; the upper one is `lower_index + 1`
    pub lower_index: usize,
}

/// First zero crossing of `values` over ascending `levels`.
///
/// A pair straddles zero only when `v[i] * v[i + 1] < 0`, so curves that
/// merely touch zero have no flip.
pub fn find_flip(levels: &[f64], values: &[f64]) -> Option<FlipPoint> {
    let n = levels.len().min(values.len());
    if n < 2 {
        return None;
    }

    (0..n - 1).find_map(|i| {
        let (v0, v1) = (values[i], values[i + 1]);
        if v0 * v1 < 0.0 {
            let (x0, x1) = (levels[i], levels[i + 1]);
            let spot = x1 - (x1 - x0) * v1 / (v1 - v0);
            Some(FlipPoint {
                spot,
                lower_index: i,
            })
        } else {
            None
        }
    })
}

/// Display band for a profile, falling back on the sign at the grid's lower
/// bound when the curve never crosses zero
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "regime", rename_all = "snake_case")]
pub enum FlipRegime {
    /// The curve crosses zero at `spot`
    Crossing { spot: f64 },
    /// Negative across the whole grid
    Negative,
    /// Positive across the whole grid
    Positive,
    /// Zero at the lower bound with no crossing
    Flat,
}

impl FlipRegime {
    pub fn classify(values: &[f64], flip: Option<&FlipPoint>) -> Self {
        if let Some(flip) = flip {
            return FlipRegime::Crossing { spot: flip.spot };
        }
        match values.first() {
            Some(v) if *v < 0.0 => FlipRegime::Negative,
            Some(v) if *v > 0.0 => FlipRegime::Positive,
            _ => FlipRegime::Flat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_crossing() {
        let levels = [90.0, 95.0, 100.0, 105.0, 110.0];
        let values = [-20.0, -10.0, 0.5, 10.0, 20.0];
        let flip = find_flip(&levels, &values).unwrap();

        assert_eq!(flip.lower_index, 1);
        assert!(values[flip.lower_index] * values[flip.lower_index + 1] < 0.0);
        assert!(flip.spot > levels[1] && flip.spot < levels[2]);
        // Interpolated from (95, -10) to (100, 0.5)
        let expected = 100.0 - 5.0 * 0.5 / 10.5;
        assert!((flip.spot - expected).abs() < 1e-12);
    }

    #[test]
    fn test_first_crossing_wins() {
        let levels = [1.0, 2.0, 3.0, 4.0, 5.0];
        let values = [1.0, -1.0, -2.0, 3.0, -4.0];
        let flip = find_flip(&levels, &values).unwrap();
        assert_eq!(flip.lower_index, 0);
        assert!((flip.spot - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_no_crossing() {
        let levels = [1.0, 2.0, 3.0];
        assert!(find_flip(&levels, &[1.0, 2.0, 3.0]).is_none());
        assert!(find_flip(&levels, &[-1.0, 0.0, 1.0]).is_none());
        assert!(find_flip(&levels, &[0.0, 0.0, 0.0]).is_none());
        assert!(find_flip(&[1.0], &[1.0]).is_none());
    }

    #[test]
    fn test_regime_fallback() {
        assert_eq!(FlipRegime::classify(&[-3.0, -1.0], None), FlipRegime::Negative);
        assert_eq!(FlipRegime::classify(&[2.0, 1.0], None), FlipRegime::Positive);
        assert_eq!(FlipRegime::classify(&[0.0, 0.0], None), FlipRegime::Flat);

        let flip = FlipPoint {
            spot: 101.0,
            lower_index: 3,
        };
        assert_eq!(
            FlipRegime::classify(&[-1.0, 1.0], Some(&flip)),
            FlipRegime::Crossing { spot: 101.0 }
        );
    }
}
