// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `format` module collects the fixed constants and parameter bounds of the FLAC format.

use carillon_core::audio::Channels;

/// The FLAC start of stream marker: "fLaC" in ASCII.
pub const STREAM_MARKER: [u8; 4] = *b"fLaC";

/// The minimum block length in samples.
pub const MIN_BLOCK_LEN: u16 = 16;
/// The maximum block length in samples.
pub const MAX_BLOCK_LEN: u16 = u16::MAX;

/// The maximum number of channels.
pub const MAX_CHANNELS: u32 = 8;

/// The minimum number of bits per sample.
pub const MIN_BITS_PER_SAMPLE: u32 = 4;
/// The maximum number of bits per sample.
pub const MAX_BITS_PER_SAMPLE: u32 = 32;

/// The maximum sample rate in Hz.
pub const MAX_SAMPLE_RATE: u32 = 655_350;

/// The maximum order of the fixed predictors.
pub const MAX_FIXED_ORDER: u32 = 4;
/// The maximum order of the linear predictor.
pub const MAX_LPC_ORDER: u32 = 32;

/// The minimum precision of quantized linear predictor coefficients.
pub const MIN_QLP_COEFF_PRECISION: u32 = 5;
/// The maximum precision of quantized linear predictor coefficients.
pub const MAX_QLP_COEFF_PRECISION: u32 = 15;

/// The maximum Rice partition order.
pub const MAX_RICE_PARTITION_ORDER: u32 = 15;

/// The maximum block length permitted by the streamable subset.
pub const SUBSET_MAX_BLOCK_LEN: u16 = 16384;
/// The maximum block length permitted by the streamable subset for sample rates of 48kHz or
/// less.
pub const SUBSET_MAX_BLOCK_LEN_48K: u16 = 4608;
/// The maximum linear predictor order permitted by the streamable subset for sample rates of
/// 48kHz or less.
pub const SUBSET_MAX_LPC_ORDER_48K: u32 = 12;
/// The maximum Rice partition order permitted by the streamable subset.
pub const SUBSET_MAX_RICE_PARTITION_ORDER: u32 = 8;

/// Maps a channel count in the range 1 to 8 onto the channel mask assigned to it by the FLAC
/// specification.
pub fn channels_from_count(count: u32) -> Option<Channels> {
    let channels = match count {
        1 => Channels::FRONT_LEFT,
        2 => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
        3 => Channels::FRONT_LEFT | Channels::FRONT_RIGHT | Channels::FRONT_CENTRE,
        4 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::REAR_LEFT
                | Channels::REAR_RIGHT
        }
        5 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::FRONT_CENTRE
                | Channels::REAR_LEFT
                | Channels::REAR_RIGHT
        }
        6 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::FRONT_CENTRE
                | Channels::LFE1
                | Channels::REAR_LEFT
                | Channels::REAR_RIGHT
        }
        7 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::FRONT_CENTRE
                | Channels::LFE1
                | Channels::REAR_CENTRE
                | Channels::SIDE_LEFT
                | Channels::SIDE_RIGHT
        }
        8 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::FRONT_CENTRE
                | Channels::LFE1
                | Channels::REAR_LEFT
                | Channels::REAR_RIGHT
                | Channels::SIDE_LEFT
                | Channels::SIDE_RIGHT
        }
        _ => return None,
    };

    Some(channels)
}

/// Returns true if the sample rate can be expressed by a frame header without deferring to the
/// stream information block. A requirement of the streamable subset.
pub fn is_subset_sample_rate(rate: u32) -> bool {
    match rate {
        8_000 | 16_000 | 22_050 | 24_000 | 32_000 | 44_100 | 48_000 | 88_200 | 96_000
        | 176_400 | 192_000 => true,
        // Expressible as whole kHz in 8 bits, Hz in 16 bits, or tens of Hz in 16 bits.
        rate if rate % 1000 == 0 && rate / 1000 <= 255 => true,
        rate if rate <= 65_535 => true,
        rate if rate % 10 == 0 && rate / 10 <= 65_535 => true,
        _ => false,
    }
}

/// Returns true if the bits per sample can be expressed by a frame header without deferring to
/// the stream information block. A requirement of the streamable subset.
pub fn is_subset_bits_per_sample(bps: u32) -> bool {
    matches!(bps, 8 | 12 | 16 | 20 | 24 | 32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_channels_from_count() {
        assert_eq!(channels_from_count(0), None);
        assert_eq!(channels_from_count(1).unwrap().count(), 1);
        assert_eq!(channels_from_count(8).unwrap().count(), 8);
        assert_eq!(channels_from_count(9), None);
    }

    #[test]
    fn verify_subset_sample_rates() {
        assert!(is_subset_sample_rate(44_100));
        assert!(is_subset_sample_rate(96_000));
        assert!(is_subset_sample_rate(11_025));
        assert!(is_subset_sample_rate(655_350));
        assert!(!is_subset_sample_rate(655_349));
    }
}
