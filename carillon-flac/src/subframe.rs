// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `subframe` module codes one channel of a block: subframe type selection and the wasted
//! bits transform on the encode side, and subframe parsing on the decode side.

use carillon_core::errors::{decode_error, unsupported_error, Result};
use carillon_core::io::{BitReader, BitWriter, ReadBytes};
use carillon_core::util::bits::sign_extend_leq32_to_i32;

use crate::fixed;
use crate::format::{MAX_QLP_COEFF_PRECISION, MIN_QLP_COEFF_PRECISION};
use crate::lpc;
use crate::lpc::Apodization;
use crate::rice;

// Decoding.

#[derive(Debug)]
enum SubFrameType {
    Constant,
    Verbatim,
    FixedLinear(u32),
    Linear(u32),
}

pub fn read_subframe<B: ReadBytes>(
    bs: &mut BitReader<'_, B>,
    frame_bps: u32,
    buf: &mut [i32],
) -> Result<()> {
    // First sub-frame bit must always 0.
    if bs.read_bit()? {
        return decode_error("flac: subframe padding is not 0");
    }

    // Next 6 bits designate the sub-frame type.
    let subframe_type_enc = bs.read_bits_leq32(6)?;

    let subframe_type = match subframe_type_enc {
        0x00 => SubFrameType::Constant,
        0x01 => SubFrameType::Verbatim,
        0x08..=0x0f => {
            let order = subframe_type_enc & 0x07;
            // The Fixed Predictor only supports orders between 0 and 4.
            if order > 4 {
                return decode_error("flac: fixed predictor orders of greater than 4 are invalid");
            }
            SubFrameType::FixedLinear(order)
        }
        0x20..=0x3f => SubFrameType::Linear((subframe_type_enc & 0x1f) + 1),
        _ => {
            return decode_error("flac: subframe type set to reserved value");
        }
    };

    // Bit 7 of the sub-frame header designates if there are any dropped (wasted in FLAC terms)
    // bits per sample in the audio sub-block. If the bit is set, unary decode the number of
    // dropped bits per sample.
    let dropped_bps = if bs.read_bit()? { bs.read_unary_zeros()? + 1 } else { 0 };

    if dropped_bps >= frame_bps {
        return decode_error("flac: wasted bits exceed the sample width");
    }

    // The bits per sample stated in the frame header is for the decoded audio sub-block
    // samples. However, it is likely that the lower order bits of all the samples are simply
    // 0. Therefore, the encoder will truncate `dropped_bps` of lower order bits for every
    // sample in a sub-block. The decoder simply needs to shift left all samples by
    // `dropped_bps` after decoding the sub-frame.
    let bps = frame_bps - dropped_bps;

    if bps > 32 {
        return unsupported_error("flac: sample widths greater than 32 bits are not supported");
    }

    match subframe_type {
        SubFrameType::Constant => decode_constant(bs, bps, buf)?,
        SubFrameType::Verbatim => decode_verbatim(bs, bps, buf)?,
        SubFrameType::FixedLinear(order) => decode_fixed_linear(bs, bps, order, buf)?,
        SubFrameType::Linear(order) => decode_linear(bs, bps, order, buf)?,
    };

    // Shift the samples to account for the dropped bits.
    if dropped_bps > 0 {
        for sample in buf.iter_mut() {
            *sample = sample.wrapping_shl(dropped_bps);
        }
    }

    Ok(())
}

fn decode_constant<B: ReadBytes>(
    bs: &mut BitReader<'_, B>,
    bps: u32,
    buf: &mut [i32],
) -> Result<()> {
    let const_sample = sign_extend_leq32_to_i32(bs.read_bits_leq32(bps)?, bps);

    for sample in buf.iter_mut() {
        *sample = const_sample;
    }

    Ok(())
}

fn decode_verbatim<B: ReadBytes>(
    bs: &mut BitReader<'_, B>,
    bps: u32,
    buf: &mut [i32],
) -> Result<()> {
    for sample in buf.iter_mut() {
        *sample = sign_extend_leq32_to_i32(bs.read_bits_leq32(bps)?, bps);
    }

    Ok(())
}

fn decode_fixed_linear<B: ReadBytes>(
    bs: &mut BitReader<'_, B>,
    bps: u32,
    order: u32,
    buf: &mut [i32],
) -> Result<()> {
    if order as usize > buf.len() {
        return decode_error("flac: fixed predictor order exceeds block length");
    }

    // The first `order` samples are encoded verbatim to warm-up the predictor.
    decode_verbatim(bs, bps, &mut buf[..order as usize])?;

    // Decode the residuals for the predicted samples.
    rice::read_residual(bs, order, buf)?;

    // Run the fixed predictor (appends to residuals).
    fixed::restore(order, buf);

    Ok(())
}

fn decode_linear<B: ReadBytes>(
    bs: &mut BitReader<'_, B>,
    bps: u32,
    order: u32,
    buf: &mut [i32],
) -> Result<()> {
    // The order of the linear predictor is between 1 and 32.
    debug_assert!(order > 0 && order <= 32);

    if order as usize > buf.len() {
        return decode_error("flac: predictor order exceeds block length");
    }

    // The first `order` samples are encoded verbatim to warm-up the predictor.
    decode_verbatim(bs, bps, &mut buf[0..order as usize])?;

    // Quantized linear predictor (QLP) coefficients precision in bits.
    let qlp_precision = bs.read_bits_leq32(4)? + 1;
    if qlp_precision > 15 {
        return decode_error("flac: qlp precision set to reserved value");
    }

    // QLP coefficients bit shift [-16, 15].
    let qlp_coeff_shift = sign_extend_leq32_to_i32(bs.read_bits_leq32(5)?, 5);

    if qlp_coeff_shift < 0 {
        return unsupported_error("flac: lpc shifts less than 0 are not supported");
    }

    // The coefficient applying to the most recent sample is stored first.
    let mut qlp_coeffs = [0i32; 32];

    for c in qlp_coeffs[..order as usize].iter_mut() {
        *c = sign_extend_leq32_to_i32(bs.read_bits_leq32(qlp_precision)?, qlp_precision);
    }

    rice::read_residual(bs, order, buf)?;

    lpc::restore(&qlp_coeffs[..order as usize], qlp_coeff_shift as u32, buf);

    Ok(())
}

// Encoding.

/// Options steering subframe type selection, resolved by the encoder from its configuration.
#[derive(Clone, Debug)]
pub struct SubframeOptions {
    /// 0 disables the linear predictor entirely.
    pub max_lpc_order: u32,
    /// Quantized coefficient precision. 0 selects a precision from the block length.
    pub qlp_precision: u32,
    /// Search all coefficient precisions rather than using one.
    pub search_precision: bool,
    /// Evaluate every predictor order instead of the estimated best.
    pub exhaustive: bool,
    /// Allow escaped (binary coded) residual partitions.
    pub escape_coding: bool,
    pub min_partition_order: u32,
    pub max_partition_order: u32,
    pub apodization: Vec<Apodization>,
}

enum SubframeKind {
    Constant {
        value: i32,
    },
    Verbatim,
    Fixed {
        order: u32,
        residual: Vec<i32>,
        plan: rice::ResidualPlan,
    },
    Lpc {
        order: u32,
        precision: u32,
        shift: u32,
        coeffs: Vec<i32>,
        residual: Vec<i32>,
        plan: rice::ResidualPlan,
    },
}

/// A fully decided subframe: the chosen coding, the wasted bits transform, and the exact coded
/// size.
pub struct SubframePlan {
    /// The exact size of the coded subframe in bits, including its header.
    pub bits: u64,
    wasted: u32,
    kind: SubframeKind,
    /// The samples after the wasted bits shift. Warm-up samples are emitted from here.
    samples: Vec<i32>,
}

/// The subframe header size in bits: padding bit, type tag, wasted bits flag, and the unary
/// wasted bits count when present.
fn header_bits(wasted: u32) -> u64 {
    8 + u64::from(wasted)
}

/// The default quantized coefficient precision for a block length.
fn default_qlp_precision(block_len: usize) -> u32 {
    let precision = match block_len {
        0..=192 => 7,
        193..=384 => 8,
        385..=576 => 9,
        577..=1152 => 10,
        1153..=2304 => 11,
        2305..=4608 => 12,
        _ => 13,
    };

    precision.clamp(MIN_QLP_COEFF_PRECISION, MAX_QLP_COEFF_PRECISION)
}

/// Chooses the cheapest subframe coding for one channel of samples at the given sample width.
pub fn plan_subframe(samples: &[i32], bps: u32, opts: &SubframeOptions) -> SubframePlan {
    let n = samples.len();

    debug_assert!(n > 0);

    // Constant subframes are detected before the wasted bits scan so that a block of identical
    // samples does not degenerate into a shift of its common trailing zeros.
    if samples.iter().all(|&s| s == samples[0]) {
        return SubframePlan {
            bits: header_bits(0) + u64::from(bps),
            wasted: 0,
            kind: SubframeKind::Constant { value: samples[0] },
            samples: Vec::new(),
        };
    }

    // The number of trailing zero bits common to every sample. Bounded by bps - 1 since at
    // least one sample is non-zero.
    let wasted = samples
        .iter()
        .map(|&s| s.trailing_zeros())
        .min()
        .unwrap_or(0)
        .min(bps - 1);

    let samples: Vec<i32> =
        if wasted > 0 { samples.iter().map(|&s| s >> wasted).collect() } else { samples.to_vec() };

    let bps = bps - wasted;
    let header = header_bits(wasted);

    // The verbatim baseline every predictor must beat.
    let mut best_bits = header + n as u64 * u64::from(bps);
    let mut best_kind = SubframeKind::Verbatim;

    // Fixed predictors.
    let fixed_orders: Vec<u32> = if opts.exhaustive {
        (0..=4u32.min(n as u32 - 1)).collect()
    }
    else {
        vec![fixed::best_order(&samples)]
    };

    let mut residual = Vec::new();

    for &order in &fixed_orders {
        if order as usize >= n {
            continue;
        }

        if !fixed::predict_residual(&samples, order, &mut residual) {
            continue;
        }

        let (plan, rice_bits) = rice::plan(
            &residual,
            order,
            n as u32,
            opts.min_partition_order,
            opts.max_partition_order,
            opts.escape_coding,
        );

        let bits = header + u64::from(order) * u64::from(bps) + rice_bits;

        if bits < best_bits {
            best_bits = bits;
            best_kind = SubframeKind::Fixed { order, residual: residual.clone(), plan };
        }
    }

    // Linear predictors.
    if opts.max_lpc_order > 0 && n > 1 {
        let max_order = opts.max_lpc_order.min(32).min(n as u32 - 1) as usize;

        let precisions: Vec<u32> = if opts.search_precision {
            (MIN_QLP_COEFF_PRECISION..=MAX_QLP_COEFF_PRECISION).collect()
        }
        else if opts.qlp_precision != 0 {
            vec![opts.qlp_precision]
        }
        else {
            vec![default_qlp_precision(n)]
        };

        let mut window = vec![0.0f64; n];
        let mut data = vec![0.0f64; n];
        let mut autoc = vec![0.0f64; max_order + 1];

        for apod in &opts.apodization {
            apod.generate(&mut window);

            for ((d, &s), &w) in data.iter_mut().zip(&samples).zip(&window) {
                *d = f64::from(s) * w;
            }

            lpc::autocorrelation(&data, &mut autoc);

            let analysis = match lpc::levinson(&autoc) {
                Some(analysis) => analysis,
                None => continue,
            };

            let orders: Vec<usize> = if opts.exhaustive {
                (1..=max_order).collect()
            }
            else {
                vec![guess_lpc_order(&analysis, n, bps, precisions[0])]
            };

            for &order in &orders {
                for &precision in &precisions {
                    let quantized = lpc::quantize_coefficients(&analysis.coeffs[order - 1], precision);

                    let (coeffs, shift) = match quantized {
                        Some(q) => q,
                        None => continue,
                    };

                    if !lpc::predict_residual(&samples, &coeffs, shift, &mut residual) {
                        continue;
                    }

                    let (plan, rice_bits) = rice::plan(
                        &residual,
                        order as u32,
                        n as u32,
                        opts.min_partition_order,
                        opts.max_partition_order,
                        opts.escape_coding,
                    );

                    let bits = header
                        + u64::from(order as u32) * u64::from(bps)
                        + 4
                        + 5
                        + u64::from(order as u32) * u64::from(precision)
                        + rice_bits;

                    if bits < best_bits {
                        best_bits = bits;
                        best_kind = SubframeKind::Lpc {
                            order: order as u32,
                            precision,
                            shift,
                            coeffs,
                            residual: residual.clone(),
                            plan,
                        };
                    }
                }
            }
        }
    }

    SubframePlan { bits: best_bits, wasted, kind: best_kind, samples }
}

/// Estimates the predictor order with the smallest coded size from the per-order modelling
/// errors of the analysis.
fn guess_lpc_order(analysis: &lpc::LpcAnalysis, n: usize, bps: u32, precision: u32) -> usize {
    let mut best_order = 1;
    let mut best_bits = f64::MAX;

    for (i, &error) in analysis.error.iter().enumerate() {
        let order = i + 1;

        let residual_bits =
            lpc::expected_bits_per_residual_sample(error, n) * (n - order) as f64;

        let overhead = (order as f64) * f64::from(bps + precision) + 4.0 + 5.0;

        let bits = residual_bits + overhead;

        if bits < best_bits {
            best_bits = bits;
            best_order = order;
        }
    }

    best_order
}

/// Writes a planned subframe to the bitstream. `bps` is the channel's sample width before the
/// wasted bits shift.
pub fn write_subframe(bw: &mut BitWriter, plan: &SubframePlan, bps: u32) {
    // Padding bit.
    bw.write_bit(false);

    // Subframe type tag.
    match &plan.kind {
        SubframeKind::Constant { .. } => bw.write_bits_leq32(0x00, 6),
        SubframeKind::Verbatim => bw.write_bits_leq32(0x01, 6),
        SubframeKind::Fixed { order, .. } => bw.write_bits_leq32(0x08 | order, 6),
        SubframeKind::Lpc { order, .. } => bw.write_bits_leq32(0x20 | (order - 1), 6),
    }

    // Wasted bits flag and unary count.
    bw.write_bit(plan.wasted > 0);

    if plan.wasted > 0 {
        bw.write_unary_zeros(plan.wasted - 1);
    }

    let bps = bps - plan.wasted;
    let block_len = plan.samples.len() as u32;

    match &plan.kind {
        SubframeKind::Constant { value } => {
            bw.write_bits_leq32_signed(*value, bps);
        }
        SubframeKind::Verbatim => {
            for &s in &plan.samples {
                bw.write_bits_leq32_signed(s, bps);
            }
        }
        SubframeKind::Fixed { order, residual, plan: rice_plan } => {
            for &s in &plan.samples[..*order as usize] {
                bw.write_bits_leq32_signed(s, bps);
            }

            rice::write_residual(bw, residual, *order, block_len, rice_plan);
        }
        SubframeKind::Lpc { order, precision, shift, coeffs, residual, plan: rice_plan } => {
            for &s in &plan.samples[..*order as usize] {
                bw.write_bits_leq32_signed(s, bps);
            }

            bw.write_bits_leq32(precision - 1, 4);
            bw.write_bits_leq32(*shift, 5);

            for &c in coeffs {
                bw.write_bits_leq32_signed(c, *precision);
            }

            rice::write_residual(bw, residual, *order, block_len, rice_plan);
        }
    }
}

#[cfg(test)]
mod tests {
    use carillon_core::io::{BitReader, BitWriter, BufReader};

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn test_options() -> SubframeOptions {
        SubframeOptions {
            max_lpc_order: 8,
            qlp_precision: 0,
            search_precision: false,
            exhaustive: false,
            escape_coding: false,
            min_partition_order: 0,
            max_partition_order: 6,
            apodization: vec![Apodization::Tukey(0.5)],
        }
    }

    fn roundtrip(samples: &[i32], bps: u32, opts: &SubframeOptions) {
        let plan = plan_subframe(samples, bps, opts);

        let mut bw = BitWriter::new();
        write_subframe(&mut bw, &plan, bps);

        assert_eq!(bw.num_bits_written(), plan.bits);

        bw.align_to_byte();
        let bytes = bw.into_bytes();

        let mut buf = vec![0i32; samples.len()];
        let mut src = BufReader::new(&bytes);
        let mut bs = BitReader::new(&mut src);

        read_subframe(&mut bs, bps, &mut buf).unwrap();

        assert_eq!(buf, samples);
    }

    #[test]
    fn verify_subframe_constant() {
        let opts = test_options();
        roundtrip(&vec![1000i32; 256], 16, &opts);
        roundtrip(&vec![0i32; 256], 16, &opts);
        roundtrip(&vec![-4i32; 16], 4, &opts);
    }

    #[test]
    fn verify_subframe_wasted_bits() {
        let opts = test_options();

        let mut rng = SmallRng::seed_from_u64(3);
        let samples: Vec<i32> = (0..512).map(|_| rng.gen_range(-2000..2000) << 3).collect();

        let plan = plan_subframe(&samples, 16, &opts);
        assert_eq!(plan.wasted, 3);

        roundtrip(&samples, 16, &opts);
    }

    #[test]
    fn verify_subframe_noise() {
        let opts = test_options();

        let mut rng = SmallRng::seed_from_u64(7);

        for bps in [4u32, 8, 16, 24, 32] {
            let max = 1i64 << (bps - 1);

            let samples: Vec<i32> =
                (0..256).map(|_| rng.gen_range(-max..max) as i32).collect();

            roundtrip(&samples, bps, &opts);
        }
    }

    #[test]
    fn verify_subframe_sine_picks_predictor() {
        let opts = test_options();

        let samples: Vec<i32> = (0..1024)
            .map(|i| {
                let t = i as f64 / 44_100.0;
                (12_000.0 * (2.0 * std::f64::consts::PI * 997.0 * t).sin()) as i32
            })
            .collect();

        let plan = plan_subframe(&samples, 16, &opts);

        // A sinusoid must compress well below the verbatim baseline.
        assert!(plan.bits < 1024 * 16);
        assert!(matches!(plan.kind, SubframeKind::Fixed { .. } | SubframeKind::Lpc { .. }));

        roundtrip(&samples, 16, &opts);

        let exhaustive = SubframeOptions { exhaustive: true, escape_coding: true, ..test_options() };
        roundtrip(&samples, 16, &exhaustive);
    }
}
