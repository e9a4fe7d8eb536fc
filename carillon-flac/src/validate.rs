// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use carillon_core::checksum::{Checksum, Md5};

/// `Validator` computes the MD5 signature of an audio stream taking into account the
/// peculiarities of FLAC's MD5 scheme: the hash runs over interleaved samples truncated to the
/// smallest whole number of little-endian bytes that holds the sample width.
#[derive(Default)]
pub struct Validator {
    state: Md5,
    buf: Vec<u8>,
}

impl Validator {
    /// Processes one block of planar channels, all of equal length, and updates the signature.
    pub fn update(&mut self, channels: &[&[i32]], bps: u32) {
        let bytes_per_sample = match bps {
            0 => return,
            1..=8 => 1,
            9..=16 => 2,
            17..=24 => 3,
            25..=32 => 4,
            _ => unreachable!(),
        };

        let n_channels = channels.len();
        let n_frames = channels.first().map_or(0, |c| c.len());

        let buf_len = n_channels * n_frames * bytes_per_sample;

        if self.buf.len() < buf_len {
            self.buf.resize(buf_len, 0u8);
        }

        // Interleave the channels into the hash buffer, truncating every sample to its
        // little-endian byte width.
        for (ch, samples) in channels.iter().enumerate() {
            for (out, sample) in self
                .buf
                .chunks_exact_mut(bytes_per_sample)
                .skip(ch)
                .step_by(n_channels)
                .zip(samples.iter())
            {
                out.copy_from_slice(&sample.to_le_bytes()[..bytes_per_sample]);
            }
        }

        self.state.update(&self.buf[..buf_len]);
    }

    /// Gets the signature of all samples processed so far.
    pub fn md5(&self) -> [u8; 16] {
        self.state.md5()
    }
}

#[cfg(test)]
mod tests {
    use super::Validator;

    #[test]
    fn verify_validator_packing() {
        // Two channels of 16-bit samples interleave into little-endian pairs. Hash the packed
        // form directly to cross-check.
        let left = [1i32, -2, 3];
        let right = [-4i32, 5, -6];

        let mut validator = Validator::default();
        validator.update(&[&left, &right], 16);

        let mut packed = Vec::new();
        for i in 0..3 {
            packed.extend_from_slice(&(left[i] as i16).to_le_bytes());
            packed.extend_from_slice(&(right[i] as i16).to_le_bytes());
        }

        let mut md5: carillon_core::checksum::Md5 = Default::default();
        use carillon_core::checksum::Checksum;
        md5.update(&packed);

        assert_eq!(validator.md5(), md5.md5());
    }

    #[test]
    fn verify_validator_incremental() {
        let samples: Vec<i32> = (0..100).collect();

        let mut one = Validator::default();
        one.update(&[&samples], 16);

        let mut two = Validator::default();
        two.update(&[&samples[..37]], 16);
        two.update(&[&samples[37..]], 16);

        assert_eq!(one.md5(), two.md5());
    }
}
