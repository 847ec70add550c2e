//! Synthetic spot grid

use serde::{Deserialize, Serialize};

use crate::core::{GexError, GexResult};

/// Evenly spaced spot levels, ascending, symmetric around the live spot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotLevelGrid {
    levels: Vec<f64>,
}

impl SpotLevelGrid {
    /// Grid of `points` levels spanning `spot * (1 ± band)`, bounds included
    pub fn around(spot: f64, band: f64, points: usize) -> GexResult<Self> {
        if !(spot.is_finite() && spot > 0.0) {
            return Err(GexError::invalid_input(format!("grid spot {} must be positive", spot)));
        }
        if !(band > 0.0 && band < 1.0) {
            return Err(GexError::invalid_input(format!("grid band {} must be in (0, 1)", band)));
        }
        if points < 2 {
            return Err(GexError::invalid_input("grid needs at least two points"));
        }

        let from = spot * (1.0 - band);
        let to = spot * (1.0 + band);
        let step = (to - from) / (points - 1) as f64;

        let mut levels: Vec<f64> = (0..points).map(|i| from + step * i as f64).collect();
        // Pin the upper bound against accumulated rounding
        levels[points - 1] = to;

        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Lower bound
    pub fn from(&self) -> f64 {
        self.levels.first().copied().unwrap_or(0.0)
    }

    /// Upper bound
    pub fn to(&self) -> f64 {
        self.levels.last().copied().unwrap_or(0.0)
    }

    pub fn contains(&self, spot: f64) -> bool {
        spot >= self.from() && spot <= self.to()
    }
}
