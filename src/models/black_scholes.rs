//! Black-Scholes Model
//!
//! Closed-form European Greeks the exposure engine needs: delta, gamma,
//! vanna and charm, under continuous dividend yield.
//!
//! Implied volatility is taken from the snapshot as given, so there is no
//! solver here.

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erfc;

use crate::core::{Greeks, OptionType};

/// Standard normal CDF
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes d1 parameter
pub fn d1(spot: f64, strike: f64, rate: f64, div: f64, vol: f64, time: f64) -> f64 {
    let forward = spot * ((rate - div) * time).exp();
    ((forward / strike).ln() + 0.5 * vol * vol * time) / (vol * time.sqrt())
}

/// Black-Scholes d2 parameter
pub fn d2(spot: f64, strike: f64, rate: f64, div: f64, vol: f64, time: f64) -> f64 {
    d1(spot, strike, rate, div, vol, time) - vol * time.sqrt()
}

/// Whether a contract can be valued at all.
///
/// Anything failing this contributes zero exposure.
pub fn inputs_valid(spot: f64, strike: f64, vol: f64, time: f64) -> bool {
    spot > 0.0
        && strike > 0.0
        && vol > 0.0
        && time > 0.0
        && spot.is_finite()
        && strike.is_finite()
        && vol.is_finite()
        && time.is_finite()
}

/// Black-Scholes delta, gamma, vanna and charm.
///
/// Returns `None` when the inputs fail [`inputs_valid`]. Charm is the delta
/// decay per year, `-dDelta/dT`.
pub fn greeks(
    spot: f64,
    strike: f64,
    rate: f64,
    div: f64,
    vol: f64,
    time: f64,
    option_type: OptionType,
) -> Option<Greeks> {
    if !inputs_valid(spot, strike, vol, time) {
        return None;
    }

    let d1 = d1(spot, strike, rate, div, vol, time);
    let d2 = d2(spot, strike, rate, div, vol, time);
    let sqrt_t = time.sqrt();
    let pdf_d1 = norm_pdf(d1);
    let div_factor = (-div * time).exp();

    let delta = match option_type {
        OptionType::Call => div_factor * norm_cdf(d1),
        OptionType::Put => -div_factor * norm_cdf(-d1),
    };

    // Same for call and put
    let gamma = div_factor * pdf_d1 / (spot * vol * sqrt_t);
    let vanna = -div_factor * pdf_d1 * d2 / vol;

    let decay = div_factor * pdf_d1 * (2.0 * (rate - div) * time - d2 * vol * sqrt_t)
        / (2.0 * time * vol * sqrt_t);
    let charm = match option_type {
        OptionType::Call => div * div_factor * norm_cdf(d1) - decay,
        OptionType::Put => -div * div_factor * norm_cdf(-d1) - decay,
    };

    let greeks = Greeks::new(delta, gamma, vanna, charm);
    greeks.is_finite().then_some(greeks)
}
