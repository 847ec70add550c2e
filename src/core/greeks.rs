//! Option Greeks
//!
//! The four sensitivities the exposure engine tracks, plus the `Greek`
//! selector used to address them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which Greek an exposure value refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Greek {
    Delta,
    Gamma,
    Vanna,
    Charm,
}

impl Greek {
    pub const ALL: [Greek; 4] = [Greek::Delta, Greek::Gamma, Greek::Vanna, Greek::Charm];

    pub fn label(&self) -> &'static str {
        match self {
            Greek::Delta => "Delta",
            Greek::Gamma => "Gamma",
            Greek::Vanna => "Vanna",
            Greek::Charm => "Charm",
        }
    }
}

impl fmt::Display for Greek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-unit option Greeks, or exposures when scaled
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// Delta: dV/dS
    pub delta: f64,
    /// Gamma: d²V/dS²
    pub gamma: f64,
    /// Vanna: d²V/dSdσ (sensitivity of delta to vol)
    pub vanna: f64,
    /// Charm: delta decay per year
    pub charm: f64,
}

impl Greeks {
    pub fn new(delta: f64, gamma: f64, vanna: f64, charm: f64) -> Self {
        Self {
            delta,
            gamma,
            vanna,
            charm,
        }
    }

    pub fn get(&self, greek: Greek) -> f64 {
        match greek {
            Greek::Delta => self.delta,
            Greek::Gamma => self.gamma,
            Greek::Vanna => self.vanna,
            Greek::Charm => self.charm,
        }
    }

    /// Scale all Greeks by a factor (e.g., open interest × multiplier)
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            delta: self.delta * factor,
            gamma: self.gamma * factor,
            vanna: self.vanna * factor,
            charm: self.charm * factor,
        }
    }

    /// Component-wise sum
    pub fn add(&self, other: &Greeks) -> Self {
        Self {
            delta: self.delta + other.delta,
            gamma: self.gamma + other.gamma,
            vanna: self.vanna + other.vanna,
            charm: self.charm + other.charm,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.delta.is_finite()
            && self.gamma.is_finite()
            && self.vanna.is_finite()
            && self.charm.is_finite()
    }
}
