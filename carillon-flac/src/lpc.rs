// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `lpc` module implements linear-predictive analysis and the integer filters derived from
//! it: apodization windows, autocorrelation, the Levinson-Durbin recursion, coefficient
//! quantization, and the forward and inverse filters.

use std::fmt;
use std::str::FromStr;

use crate::format::{MAX_LPC_ORDER, MAX_QLP_COEFF_PRECISION};

/// The window applied to a block before autocorrelation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Apodization {
    Rectangle,
    Hann,
    Triangle,
    Welch,
    /// A tapered cosine window. The parameter is the fraction of the window inside the taper,
    /// between 0 and 1.
    Tukey(f64),
    /// A Gaussian window with the given standard deviation as a fraction of half the window
    /// length, between 0 and 0.5.
    Gauss(f64),
}

impl Apodization {
    /// Fills `window` with the window function coefficients.
    pub fn generate(&self, window: &mut [f64]) {
        let n = window.len();

        if n == 0 {
            return;
        }

        match *self {
            Apodization::Rectangle => {
                window.fill(1.0);
            }
            Apodization::Hann => {
                let scale = 2.0 * std::f64::consts::PI / (n - 1) as f64;

                for (i, w) in window.iter_mut().enumerate() {
                    *w = 0.5 - 0.5 * (scale * i as f64).cos();
                }
            }
            Apodization::Triangle => {
                for (i, w) in window.iter_mut().enumerate() {
                    let pos = (2 * i + 1) as f64 / n as f64;
                    *w = 1.0 - (pos - 1.0).abs();
                }
            }
            Apodization::Welch => {
                let half = (n - 1) as f64 / 2.0;

                for (i, w) in window.iter_mut().enumerate() {
                    let pos = (i as f64 - half) / half;
                    *w = 1.0 - pos * pos;
                }
            }
            Apodization::Tukey(p) => {
                let p = p.clamp(0.0, 1.0);

                // The number of samples inside each cosine taper.
                let taper = (p * (n - 1) as f64 / 2.0) as usize;

                window.fill(1.0);

                if taper > 0 {
                    let scale = std::f64::consts::PI / taper as f64;

                    for i in 0..taper {
                        let w = 0.5 + 0.5 * (scale * i as f64 - std::f64::consts::PI).cos();
                        window[i] = w;
                        window[n - 1 - i] = w;
                    }
                }
            }
            Apodization::Gauss(stddev) => {
                let stddev = stddev.clamp(1.0e-6, 0.5);
                let half = (n - 1) as f64 / 2.0;

                for (i, w) in window.iter_mut().enumerate() {
                    let pos = (i as f64 - half) / (stddev * half);
                    *w = (-0.5 * pos * pos).exp();
                }
            }
        }
    }
}

impl fmt::Display for Apodization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Apodization::Rectangle => write!(f, "rectangle"),
            Apodization::Hann => write!(f, "hann"),
            Apodization::Triangle => write!(f, "triangle"),
            Apodization::Welch => write!(f, "welch"),
            Apodization::Tukey(p) => write!(f, "tukey({})", p),
            Apodization::Gauss(s) => write!(f, "gauss({})", s),
        }
    }
}

impl FromStr for Apodization {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        // Parenthesized single parameter, e.g. "tukey(0.5)".
        let param = |name: &str| -> Option<Result<f64, &'static str>> {
            let rest = s.strip_prefix(name)?;
            let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
            Some(inner.trim().parse::<f64>().map_err(|_| "invalid window parameter"))
        };

        match s {
            "rectangle" => Ok(Apodization::Rectangle),
            "hann" => Ok(Apodization::Hann),
            "triangle" => Ok(Apodization::Triangle),
            "welch" => Ok(Apodization::Welch),
            _ => {
                if let Some(p) = param("tukey") {
                    Ok(Apodization::Tukey(p?))
                }
                else if let Some(p) = param("gauss") {
                    Ok(Apodization::Gauss(p?))
                }
                else {
                    Err("unknown apodization window")
                }
            }
        }
    }
}

/// Computes the autocorrelation of `data` for lags 0 up-to `autoc.len() - 1` via time-domain
/// sums.
pub fn autocorrelation(data: &[f64], autoc: &mut [f64]) {
    for (lag, r) in autoc.iter_mut().enumerate() {
        let mut sum = 0.0;

        for i in lag..data.len() {
            sum += data[i] * data[i - lag];
        }

        *r = sum;
    }
}

/// The result of the Levinson-Durbin recursion: the linear predictor coefficients for every
/// order up-to the analysis maximum, and the prediction error of each.
pub struct LpcAnalysis {
    /// `coeffs[k]` holds the `k + 1` coefficients of the order `k + 1` predictor. The first
    /// coefficient applies to the most recent sample.
    pub coeffs: Vec<Vec<f64>>,
    /// `error[k]` is the modelling error of the order `k + 1` predictor.
    pub error: Vec<f64>,
}

/// Runs the Levinson-Durbin recursion over the autocorrelation, producing predictor
/// coefficients and errors for all orders from 1 up-to `autoc.len() - 1`. Returns `None` when
/// the signal has no usable correlation structure (e.g. digital silence).
pub fn levinson(autoc: &[f64]) -> Option<LpcAnalysis> {
    let max_order = autoc.len() - 1;

    if autoc[0] == 0.0 {
        return None;
    }

    let mut lpc = [0.0f64; MAX_LPC_ORDER as usize];
    let mut err = autoc[0];

    let mut analysis =
        LpcAnalysis { coeffs: Vec::with_capacity(max_order), error: Vec::with_capacity(max_order) };

    for i in 0..max_order {
        if err == 0.0 {
            // A perfectly modelled signal. Repeat the final predictor for remaining orders.
            let last = analysis.coeffs.last()?.clone();
            analysis.coeffs.push(last);
            analysis.error.push(0.0);
            continue;
        }

        // The reflection coefficient for this order.
        let mut r = -autoc[i + 1];
        for j in 0..i {
            r -= lpc[j] * autoc[i - j];
        }
        r /= err;

        lpc[i] = r;

        for j in 0..i >> 1 {
            let tmp = lpc[j];
            lpc[j] += r * lpc[i - 1 - j];
            lpc[i - 1 - j] += r * tmp;
        }

        if i & 1 != 0 {
            lpc[i >> 1] += lpc[i >> 1] * r;
        }

        err *= 1.0 - r * r;

        // The prediction convention is x̂[n] = sum(c[j] * x[n-1-j]), so negate.
        analysis.coeffs.push(lpc[..=i].iter().map(|c| -c).collect());
        analysis.error.push(err);
    }

    Some(analysis)
}

/// An estimate of the number of bits per residual sample a predictor with modelling error
/// `error` over `n` samples will require.
pub fn expected_bits_per_residual_sample(error: f64, n: usize) -> f64 {
    if error > 0.0 && n > 0 {
        (0.5 * (error / n as f64).log2()).max(0.0)
    }
    else {
        0.0
    }
}

/// Quantizes real-valued predictor coefficients to `precision` bit signed integers with a
/// common right-shift, distributing accumulated rounding error over successive coefficients.
/// Returns `None` when the coefficients cannot be usefully quantized.
pub fn quantize_coefficients(coeffs: &[f64], precision: u32) -> Option<(Vec<i32>, u32)> {
    debug_assert!(precision >= 2 && precision <= MAX_QLP_COEFF_PRECISION);

    let cmax = coeffs.iter().fold(0.0f64, |max, c| max.max(c.abs()));

    if cmax <= 0.0 || !cmax.is_finite() {
        return None;
    }

    // The exponent e such that cmax = f * 2^e with 0.5 <= f < 1.
    let log2cmax = (cmax.log2().floor() as i32) + 1;

    // Choose the largest shift such that the largest coefficient still fits in `precision`
    // signed bits. The shift is stored in a 5-bit signed field, but negative shifts are
    // needless precision loss, so clamp to the non-negative range.
    let mut shift = precision as i32 - log2cmax - 1;

    if shift > 15 {
        shift = 15;
    }
    else if shift < 0 {
        shift = 0;
    }

    let qmax = (1i64 << (precision - 1)) - 1;
    let qmin = -(1i64 << (precision - 1));

    let scale = f64::from(1u32 << shift as u32);

    let mut quantized = Vec::with_capacity(coeffs.len());
    let mut error = 0.0f64;

    for &c in coeffs {
        let v = c * scale + error;
        let q = (v.round() as i64).clamp(qmin, qmax);

        error = v - q as f64;
        quantized.push(q as i32);
    }

    Some((quantized, shift as u32))
}

/// Computes the residual of the quantized predictor. The first coefficient applies to the most
/// recent sample. Returns false if any residual overflows the 32-bit range the entropy coder
/// works in.
pub fn predict_residual(samples: &[i32], coeffs: &[i32], shift: u32, residual: &mut Vec<i32>) -> bool {
    residual.clear();

    let order = coeffs.len();

    for i in order..samples.len() {
        let mut sum = 0i64;

        for (j, &c) in coeffs.iter().enumerate() {
            sum += i64::from(c) * i64::from(samples[i - 1 - j]);
        }

        let r = i64::from(samples[i]) - (sum >> shift);

        if r < i64::from(i32::MIN) || r > i64::from(i32::MAX) {
            return false;
        }

        residual.push(r as i32);
    }

    true
}

/// Restores the signal from a linear predictor's residual in place. The first `coeffs.len()`
/// entries of `buf` are warm-up samples, and the remainder are residuals. The arithmetic is
/// the exact integer inverse of [`predict_residual`]: a fully serialized 64-bit
/// accumulate-then-shift per sample.
pub fn restore(coeffs: &[i32], shift: u32, buf: &mut [i32]) {
    let order = coeffs.len();

    for i in order..buf.len() {
        let mut sum = 0i64;

        for (j, &c) in coeffs.iter().enumerate() {
            sum += i64::from(c) * i64::from(buf[i - 1 - j]);
        }

        buf[i] = buf[i].wrapping_add((sum >> shift) as i32);
    }
}
