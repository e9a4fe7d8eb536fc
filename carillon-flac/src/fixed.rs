// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `fixed` module applies and inverts the five fixed polynomial predictors.

use std::num::Wrapping;

/// Computes the sum of absolute residuals each fixed predictor order would produce, and returns
/// the order with the smallest sum. Ties are broken toward the lower order, since a lower order
/// has fewer warm-up samples to store.
pub fn best_order(samples: &[i32]) -> u32 {
    if samples.len() <= 4 {
        return 0;
    }

    let mut error = [0u64; 5];

    for i in 4..samples.len() {
        let s0 = i64::from(samples[i]);
        let s1 = i64::from(samples[i - 1]);
        let s2 = i64::from(samples[i - 2]);
        let s3 = i64::from(samples[i - 3]);
        let s4 = i64::from(samples[i - 4]);

        // Successive differences of the signal. The order-k residual is the k-th difference.
        let e1 = s0 - s1;
        let e2 = e1 - (s1 - s2);
        let e3 = e2 - (s1 - 2 * s2 + s3);
        let e4 = e3 - (s1 - 3 * s2 + 3 * s3 - s4);

        error[0] += s0.unsigned_abs();
        error[1] += e1.unsigned_abs();
        error[2] += e2.unsigned_abs();
        error[3] += e3.unsigned_abs();
        error[4] += e4.unsigned_abs();
    }

    let mut best = 0;

    for (order, &err) in error.iter().enumerate() {
        if err < error[best] {
            best = order;
        }
    }

    best as u32
}

/// Computes the residual of the fixed predictor of the given order. The residual holds
/// `samples.len() - order` entries. Returns false if any residual overflows the 32-bit range
/// the entropy coder works in, in which case the caller should fall back to another subframe
/// type.
pub fn predict_residual(samples: &[i32], order: u32, residual: &mut Vec<i32>) -> bool {
    residual.clear();

    let order = order as usize;

    for i in order..samples.len() {
        let s1 = || i64::from(samples[i - 1]);
        let s2 = || i64::from(samples[i - 2]);
        let s3 = || i64::from(samples[i - 3]);
        let s4 = || i64::from(samples[i - 4]);

        let predicted = match order {
            0 => 0,
            1 => s1(),
            2 => 2 * s1() - s2(),
            3 => 3 * s1() - 3 * s2() + s3(),
            4 => 4 * s1() - 6 * s2() + 4 * s3() - s4(),
            _ => unreachable!(),
        };

        let r = i64::from(samples[i]) - predicted;

        if r < i64::from(i32::MIN) || r > i64::from(i32::MAX) {
            return false;
        }

        residual.push(r as i32);
    }

    true
}

/// Restores the signal from a fixed predictor's residual in place. The first `order` entries of
/// `buf` are warm-up samples, and the remainder are residuals.
pub fn restore(order: u32, buf: &mut [i32]) {
    debug_assert!(order <= 4);

    match order {
        // A 0th order predictor always predicts 0, and therefore adds nothing to any of the
        // samples in buf. Do nothing.
        0 => (),
        // A 1st order predictor always returns the previous sample since the polynomial is:
        // s(i) = 1*s(i-1).
        1 => {
            for i in 1..buf.len() {
                buf[i] = buf[i].wrapping_add(buf[i - 1]);
            }
        }
        // A 2nd order predictor uses the polynomial: s(i) = 2*s(i-1) - 1*s(i-2).
        2 => {
            for i in 2..buf.len() {
                let a = Wrapping(-1) * Wrapping(i64::from(buf[i - 2]));
                let b = Wrapping(2) * Wrapping(i64::from(buf[i - 1]));
                buf[i] = buf[i].wrapping_add((a + b).0 as i32);
            }
        }
        // A 3rd order predictor uses the polynomial: s(i) = 3*s(i-1) - 3*s(i-2) + 1*s(i-3).
        3 => {
            for i in 3..buf.len() {
                let a = Wrapping(1) * Wrapping(i64::from(buf[i - 3]));
                let b = Wrapping(-3) * Wrapping(i64::from(buf[i - 2]));
                let c = Wrapping(3) * Wrapping(i64::from(buf[i - 1]));
                buf[i] = buf[i].wrapping_add((a + b + c).0 as i32);
            }
        }
        // A 4th order predictor uses the polynomial:
        // s(i) = 4*s(i-1) - 6*s(i-2) + 4*s(i-3) - 1*s(i-4).
        4 => {
            for i in 4..buf.len() {
                let a = Wrapping(-1) * Wrapping(i64::from(buf[i - 4]));
                let b = Wrapping(4) * Wrapping(i64::from(buf[i - 3]));
                let c = Wrapping(-6) * Wrapping(i64::from(buf[i - 2]));
                let d = Wrapping(4) * Wrapping(i64::from(buf[i - 1]));
                buf[i] = buf[i].wrapping_add((a + b + c + d).0 as i32);
            }
        }
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_fixed_roundtrip() {
        let samples = [13, 12, 17, 21, 20, 19, 25, 32, 31, 30, 28, 21, 18];

        for order in 0..=4u32 {
            let mut residual = Vec::new();
            assert!(predict_residual(&samples, order, &mut residual));

            let mut buf = samples.to_vec();
            buf[order as usize..].copy_from_slice(&residual);

            restore(order, &mut buf);

            assert_eq!(&buf, &samples);
        }
    }

    #[test]
    fn verify_best_order() {
        // A linear ramp is perfectly predicted by the order 2 polynomial.
        let ramp: Vec<i32> = (0..64).map(|i| 3 * i + 7).collect();
        assert_eq!(best_order(&ramp), 2);

        // A constant signal is perfectly predicted by the order 1 polynomial.
        let constant = vec![42i32; 64];
        assert_eq!(best_order(&constant), 1);

        // Too short to estimate.
        assert_eq!(best_order(&[1, 2, 3]), 0);
    }
}
