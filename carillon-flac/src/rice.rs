// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `rice` module implements partitioned Rice coding of prediction residuals.
//!
//! A coded residual begins with a 2-bit coding method, a 4-bit partition order `p`, and then
//! `2^p` partitions, each led by a Rice parameter (4 or 5 bits wide depending on the method).
//! An all-ones parameter escapes the partition to fixed-width binary coding. The first
//! partition is short by the predictor order since warm-up samples are stored verbatim.

use carillon_core::errors::{decode_error, Result};
use carillon_core::io::{BitReader, BitWriter, ReadBytes};
use carillon_core::util::bits::{sign_extend_leq32_to_i32, signed_bit_width};

/// The largest Rice parameter expressible by the 4-bit parameter variant.
const MAX_RICE_PARAM: u32 = 14;
/// The largest Rice parameter expressible by the 5-bit parameter variant.
const MAX_RICE_PARAM_WIDE: u32 = 30;

/// Folds a signed residual onto the non-negative integers: 0, -1, 1, -2, 2, ... map onto
/// 0, 1, 2, 3, 4, ...
#[inline(always)]
pub fn rice_fold(value: i32) -> u64 {
    let v = i64::from(value);
    ((v << 1) ^ (v >> 63)) as u64
}

/// The inverse of [`rice_fold`].
#[inline(always)]
pub fn rice_unfold(word: u64) -> i32 {
    // Divide the folded value by 2 and convert to signed.
    let div2 = (word >> 1) as i32;

    // Either all zeros for even inputs, or all ones for odd inputs.
    let sign = -((word & 0x1) as i32);

    // For even inputs the XOR yields div2, for odd inputs -div2 - 1.
    div2 ^ sign
}

/// How a single partition's residuals are coded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PartitionEncoding {
    /// Unary quotient with `param` binary remainder bits per residual.
    Rice { param: u32 },
    /// Escaped to plain `width`-bit signed binary per residual.
    Escape { width: u32 },
}

/// The chosen partitioning of one subframe's residual.
#[derive(Debug)]
pub struct ResidualPlan {
    pub partition_order: u32,
    pub partitions: Vec<PartitionEncoding>,
    /// True when the 5-bit parameter variant is required.
    pub wide: bool,
}

impl ResidualPlan {
    /// The number of bits the coded residual will occupy, including the method and partition
    /// order fields.
    pub fn bits(&self, folded: &[u64], pred_order: u32, block_len: u32) -> u64 {
        let param_width: u32 = if self.wide { 5 } else { 4 };

        let mut bits = 2 + 4;

        for (i, partition) in self.partitions.iter().enumerate() {
            let (start, end) = partition_span(
                i as u32,
                self.partition_order,
                pred_order,
                block_len,
            );

            bits += u64::from(param_width);
            bits += partition_bits(&folded[start..end], partition);
        }

        bits
    }
}

/// The residual index span of partition `index` at the given partition order.
fn partition_span(index: u32, partition_order: u32, pred_order: u32, block_len: u32) -> (usize, usize) {
    let psize = (block_len >> partition_order) as usize;

    let start = psize * index as usize;
    let end = psize * (index as usize + 1);

    // The first partition is short by the warm-up samples; spans are indices into the residual,
    // which excludes them.
    if index == 0 {
        (0, end - pred_order as usize)
    }
    else {
        (start - pred_order as usize, end - pred_order as usize)
    }
}

/// The content bits of one partition under a given encoding (excluding the parameter field).
fn partition_bits(folded: &[u64], encoding: &PartitionEncoding) -> u64 {
    match *encoding {
        PartitionEncoding::Rice { param } => {
            let mut bits = 0;
            for &f in folded {
                bits += (f >> param) + 1 + u64::from(param);
            }
            bits
        }
        PartitionEncoding::Escape { width } => 5 + folded.len() as u64 * u64::from(width),
    }
}

/// Chooses the cheapest encoding for one partition.
fn best_partition_encoding(folded: &[u64], allow_escape: bool) -> PartitionEncoding {
    let mut best = PartitionEncoding::Rice { param: 0 };
    let mut best_bits = u64::MAX;

    for param in 0..=MAX_RICE_PARAM_WIDE {
        let candidate = PartitionEncoding::Rice { param };
        let bits = partition_bits(folded, &candidate);

        if bits < best_bits {
            best = candidate;
            best_bits = bits;
        }

        // The cost is near-unimodal in the parameter. Once the per-residual overhead alone
        // exceeds the best cost there is no point searching further.
        if folded.len() as u64 * u64::from(param + 1) > best_bits {
            break;
        }
    }

    if allow_escape {
        let width = folded.iter().map(|&f| signed_bit_width(i64::from(rice_unfold(f)))).max();

        // The escape's raw width field is 5 bits, so widths beyond 31 cannot be coded.
        if let Some(width) = width.filter(|&w| w <= 31) {
            let candidate = PartitionEncoding::Escape { width };

            if partition_bits(folded, &candidate) < best_bits {
                best = candidate;
            }
        }
    }

    best
}

/// The largest partition order usable for a block: the block length must divide evenly into
/// `2^p` partitions and the first partition must retain at least one residual after the
/// warm-up samples are deducted.
pub fn max_partition_order(block_len: u32, pred_order: u32) -> u32 {
    let mut order = block_len.trailing_zeros();

    while order > 0 && (block_len >> order) <= pred_order {
        order -= 1;
    }

    order
}

/// Searches partition orders between `min_order` and `max_order` for the cheapest partitioned
/// Rice coding of `residual`, and returns the plan together with its total bit cost.
pub fn plan(
    residual: &[i32],
    pred_order: u32,
    block_len: u32,
    min_order: u32,
    max_order: u32,
    allow_escape: bool,
) -> (ResidualPlan, u64) {
    debug_assert!(residual.len() == (block_len - pred_order) as usize);

    let folded: Vec<u64> = residual.iter().map(|&r| rice_fold(r)).collect();

    let limit = max_partition_order(block_len, pred_order).min(max_order);
    let min_order = min_order.min(limit);

    let mut best: Option<(ResidualPlan, u64)> = None;

    for order in min_order..=limit {
        let n_partitions = 1u32 << order;

        let mut partitions = Vec::with_capacity(n_partitions as usize);
        let mut wide = false;

        for i in 0..n_partitions {
            let (start, end) = partition_span(i, order, pred_order, block_len);
            let encoding = best_partition_encoding(&folded[start..end], allow_escape);

            if let PartitionEncoding::Rice { param } = encoding {
                if param > MAX_RICE_PARAM {
                    wide = true;
                }
            }

            partitions.push(encoding);
        }

        let plan = ResidualPlan { partition_order: order, partitions, wide };
        let bits = plan.bits(&folded, pred_order, block_len);

        match best {
            Some((_, best_bits)) if bits >= best_bits => (),
            _ => best = Some((plan, bits)),
        }
    }

    best.expect("at least one partition order is always valid")
}

/// Writes a planned residual coding to the bitstream.
pub fn write_residual(
    bw: &mut BitWriter,
    residual: &[i32],
    pred_order: u32,
    block_len: u32,
    plan: &ResidualPlan,
) {
    let (method, param_width, escape_code) =
        if plan.wide { (0x1, 5, 0x1f) } else { (0x0, 4, 0x0f) };

    bw.write_bits_leq32(method, 2);
    bw.write_bits_leq32(plan.partition_order, 4);

    for (i, partition) in plan.partitions.iter().enumerate() {
        let (start, end) = partition_span(i as u32, plan.partition_order, pred_order, block_len);

        match *partition {
            PartitionEncoding::Rice { param } => {
                bw.write_bits_leq32(param, param_width);

                for &r in &residual[start..end] {
                    let folded = rice_fold(r);

                    let mut quotient = folded >> param;

                    // The quotient of a sanely planned partition is tiny, but the unary writer
                    // only takes 32-bits at a time.
                    while quotient > u64::from(u32::MAX) {
                        bw.write_bits_leq32(0, 32);
                        quotient -= 32;
                    }

                    bw.write_unary_zeros(quotient as u32);
                    bw.write_bits_leq64(folded, param);
                }
            }
            PartitionEncoding::Escape { width } => {
                bw.write_bits_leq32(escape_code, param_width);
                bw.write_bits_leq32(width, 5);

                for &r in &residual[start..end] {
                    bw.write_bits_leq32_signed(r, width);
                }
            }
        }
    }
}

/// Reads a coded residual from the bitstream. On entry the first `pred_order` entries of `buf`
/// hold the warm-up samples; on return the remainder holds the raw residuals.
pub fn read_residual<B: ReadBytes>(
    bs: &mut BitReader<'_, B>,
    pred_order: u32,
    buf: &mut [i32],
) -> Result<()> {
    let method_enc = bs.read_bits_leq32(2)?;

    // The FLAC specification defines two residual coding methods: Rice and Rice2. The only
    // difference between the two is the bit width of the Rice parameter.
    let param_bit_width = match method_enc {
        0x0 => 4,
        0x1 => 5,
        _ => {
            return decode_error("flac: residual method set to reserved value");
        }
    };

    // Read the partition order.
    let order = bs.read_bits_leq32(4)?;

    // The number of partitions is equal to 2^order.
    let n_partitions = 1usize << order;

    // In general, all partitions have the same number of samples such that the sum of all
    // partition lengths equal the block length. However, since warm-up samples are stored
    // verbatim, the first partition has pred_order less samples.
    let n_partition_samples = buf.len() >> order;

    if pred_order as usize > n_partition_samples {
        return decode_error("flac: residual partition too small for given predictor order");
    }

    // Ensure that the sum of all partition lengths equal the block size.
    if n_partitions * n_partition_samples != buf.len() {
        return decode_error("flac: block size is not same as encoded residual");
    }

    // Decode the first partition as it has less than n_partition_samples samples.
    read_rice_partition(bs, param_bit_width, &mut buf[pred_order as usize..n_partition_samples])?;

    // Decode the remaining partitions.
    for buf_chunk in buf[n_partition_samples..].chunks_mut(n_partition_samples) {
        read_rice_partition(bs, param_bit_width, buf_chunk)?;
    }

    Ok(())
}

fn read_rice_partition<B: ReadBytes>(
    bs: &mut BitReader<'_, B>,
    param_bit_width: u32,
    buf: &mut [i32],
) -> Result<()> {
    // Read the encoding parameter, generally the Rice parameter.
    let rice_param = bs.read_bits_leq32(param_bit_width)?;

    // If the Rice parameter is all 1s (e.g., 0xf for a 4-bit parameter, 0x1f for a 5-bit
    // parameter), then it indicates that residuals in this partition are not Rice encoded,
    // rather they are binary encoded.
    if rice_param < (1 << param_bit_width) - 1 {
        for sample in buf.iter_mut() {
            let q = bs.read_unary_zeros()?;
            let r = bs.read_bits_leq64(rice_param)?;
            *sample = rice_unfold((u64::from(q) << rice_param) | r);
        }
    }
    else {
        let residual_bits = bs.read_bits_leq32(5)?;

        for sample in buf.iter_mut() {
            *sample = sign_extend_leq32_to_i32(bs.read_bits_leq32(residual_bits)?, residual_bits);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use carillon_core::io::{BitReader, BitWriter, BufReader};

    use super::*;

    #[test]
    fn verify_rice_fold_unfold() {
        // Input  => 0  1  2  3  4  5  6  7  8  9  10
        // Output => 0 -1  1 -2  2 -3  3 -4  4 -5   5
        assert_eq!(rice_unfold(0), 0);
        assert_eq!(rice_unfold(1), -1);
        assert_eq!(rice_unfold(2), 1);
        assert_eq!(rice_unfold(3), -2);
        assert_eq!(rice_unfold(4), 2);

        for v in [0i32, -1, 1, 255, -256, i32::MAX, i32::MIN] {
            assert_eq!(rice_unfold(rice_fold(v)), v);
        }
    }

    #[test]
    fn verify_max_partition_order() {
        assert_eq!(max_partition_order(4096, 0), 12);
        assert_eq!(max_partition_order(4096, 2), 10);
        assert_eq!(max_partition_order(192, 4), 5);
        assert_eq!(max_partition_order(1000, 8), 3);
        assert_eq!(max_partition_order(65_535, 12), 0);
    }

    fn roundtrip(residual: &[i32], pred_order: u32, block_len: u32, escape: bool) {
        let (plan, bits) = plan(residual, pred_order, block_len, 0, 8, escape);

        let mut bw = BitWriter::new();
        write_residual(&mut bw, residual, pred_order, block_len, &plan);

        assert_eq!(bw.num_bits_written(), bits);

        bw.align_to_byte();
        let bytes = bw.into_bytes();

        let mut buf = vec![0i32; block_len as usize];
        let mut src = BufReader::new(&bytes);
        let mut bs = BitReader::new(&mut src);

        read_residual(&mut bs, pred_order, &mut buf).unwrap();

        assert_eq!(&buf[pred_order as usize..], residual);
    }

    #[test]
    fn verify_residual_roundtrip() {
        let residual: Vec<i32> = (0..256).map(|i| ((i * 37) % 101) - 50).collect();

        roundtrip(&residual, 0, 256, false);
        roundtrip(&residual[2..], 2, 256, false);
        roundtrip(&residual[2..], 2, 256, true);
    }

    #[test]
    fn verify_residual_roundtrip_outliers() {
        // A mostly quiet residual with hard outliers favours escaped partitions.
        let mut residual = vec![0i32; 512];
        residual[100] = 1 << 28;
        residual[101] = -(1 << 28);

        roundtrip(&residual, 0, 512, true);
        roundtrip(&residual, 0, 512, false);
    }

    #[test]
    fn verify_residual_plan_prefers_quiet_partitions() {
        // Loud first half, silent second half: a non-zero partition order should win.
        let residual: Vec<i32> =
            (0..512).map(|i| if i < 256 { ((i * 31) % 64) - 32 } else { 0 }).collect();

        let (plan, _) = plan(&residual, 0, 512, 0, 8, false);

        assert!(plan.partition_order > 0);
    }
}
