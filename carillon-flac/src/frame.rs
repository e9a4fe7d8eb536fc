// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use carillon_core::checksum::{Checksum, Crc8Ccitt};
use carillon_core::errors::{decode_error, Result};
use carillon_core::io::{BitWriter, ChecksumReader, ReadBytes};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockingStrategy {
    Fixed,
    Variable,
}

#[derive(Copy, Clone, Debug)]
pub enum BlockSequence {
    BySample(u64),
    ByFrame(u32),
}

/// `ChannelAssignment` describes the mapping between the samples decoded from a subframe and
/// the channel those samples belong to. It is also through the `ChannelAssignment` that the
/// decoder is instructed on how to decorrelate stereo channels.
///
/// For LeftSide or RightSide channel assignments, one channel is stored independently while the
/// other stores a difference. The difference is always stored as Left - Right. For the MidSide
/// channel assignment, no channels are stored independently, rather, a Mid (average) channel
/// and a Difference channel are stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// All channels are independently coded and no decorrelation step is required.
    Independent(u32),
    /// Channel 0 is the Left channel, and channel 1 is a Difference channel. The Right channel
    /// is restored by subtracting the Difference channel from the Left channel (R = L - D).
    LeftSide,
    /// Channel 0 is the Mid channel (Left/2 + Right/2), and channel 1 is the Difference channel
    /// (Left - Right).
    MidSide,
    /// Channel 0 is the Difference channel, and channel 1 is the Right channel. The Left
    /// channel is restored by adding the Difference channel to the Right channel (L = R + D).
    RightSide,
}

impl ChannelAssignment {
    /// The number of channels the assignment codes for.
    pub fn count(&self) -> u32 {
        match self {
            ChannelAssignment::Independent(count) => *count,
            _ => 2,
        }
    }

    /// The 4-bit frame header code of the assignment.
    pub fn code(&self) -> u32 {
        match self {
            ChannelAssignment::Independent(count) => *count - 1,
            ChannelAssignment::LeftSide => 0x8,
            ChannelAssignment::RightSide => 0x9,
            ChannelAssignment::MidSide => 0xa,
        }
    }
}

pub struct FrameHeader {
    pub blocking_strategy: BlockingStrategy,
    pub block_sequence: BlockSequence,
    pub block_num_samples: u16,
    pub channel_assignment: ChannelAssignment,
    pub bits_per_sample: Option<u32>,
    pub sample_rate: Option<u32>,
}

impl FrameHeader {
    /// The index of the first sample of the frame, per channel. For fixed-blocksize streams the
    /// nominal (maximum) block length of the stream is required to convert a frame number into
    /// a sample number.
    pub fn first_sample(&self, nominal_block_len: u16) -> u64 {
        match self.block_sequence {
            BlockSequence::BySample(sample) => sample,
            BlockSequence::ByFrame(frame) => u64::from(frame) * u64::from(nominal_block_len),
        }
    }
}

pub fn sync_frame<B: ReadBytes>(reader: &mut B) -> Result<u16> {
    let mut sync = 0u16;

    // Synchronize stream to Frame Header. FLAC specifies a byte-aligned 14 bit sync code of
    // `0b11_1111_1111_1110`. This would be difficult to find on its own. Expand the search to
    // a 16-bit field of `0b1111_1111_1111_10xx` and search a word at a time.
    while (sync & 0xfffc) != 0xfff8 {
        sync = sync.wrapping_shl(8) | u16::from(reader.read_u8()?);
    }

    Ok(sync)
}

pub fn read_frame_header<B: ReadBytes>(reader: &mut B, sync: u16) -> Result<FrameHeader> {
    // The header is checksummed with a CRC8 hash. Include the sync code in this CRC.
    let mut crc8 = Crc8Ccitt::new(0);
    crc8.update(&sync.to_be_bytes());

    let mut reader_crc8 = ChecksumReader::new(reader, crc8);

    // Extract the blocking strategy from the expanded synchronization code.
    let blocking_strategy = match sync & 0x1 {
        0 => BlockingStrategy::Fixed,
        _ => BlockingStrategy::Variable,
    };

    // Read all the standard frame description fields as one 16-bit value and extract the
    // fields.
    let desc = reader_crc8.read_be_u16()?;

    let block_size_enc = u32::from((desc & 0xf000) >> 12);
    let sample_rate_enc = u32::from((desc & 0x0f00) >> 8);
    let channels_enc = u32::from((desc & 0x00f0) >> 4);
    let bits_per_sample_enc = u32::from((desc & 0x000e) >> 1);

    if (desc & 0x0001) == 1 {
        return decode_error("flac: frame header reserved bit is not set to mandatory value");
    }

    let block_sequence = match blocking_strategy {
        // Fixed-blocksize stream sequence blocks by a frame number.
        BlockingStrategy::Fixed => {
            let frame = match utf8_decode_be_u64(&mut reader_crc8)? {
                Some(frame) => frame,
                None => return decode_error("flac: frame sequence number is not valid"),
            };

            // The frame number should only be 31-bits. Since it is UTF8 encoded, the actual
            // length cannot be enforced by the decoder. Return an error if the frame number
            // exceeds the maximum 31-bit value.
            if frame > 0x7fff_ffff {
                return decode_error("flac: frame sequence number exceeds 31-bits");
            }

            BlockSequence::ByFrame(frame as u32)
        }
        // Variable-blocksize streams sequence blocks by a sample number.
        BlockingStrategy::Variable => {
            let sample = match utf8_decode_be_u64(&mut reader_crc8)? {
                Some(sample) => sample,
                None => return decode_error("flac: sample sequence number is not valid"),
            };

            // The sample number should only be 36-bits.
            if sample > 0x000f_ffff_ffff {
                return decode_error("flac: sample sequence number exceeds 36-bits");
            }

            BlockSequence::BySample(sample)
        }
    };

    let block_num_samples = match block_size_enc {
        0x1 => 192,
        0x2..=0x5 => 576 * (1 << (block_size_enc - 2)),
        0x6 => u16::from(reader_crc8.read_u8()?) + 1,
        0x7 => {
            let block_size = reader_crc8.read_be_u16()?;
            if block_size == 0xffff {
                return decode_error("flac: block size not allowed to be greater than 65535");
            }
            block_size + 1
        }
        0x8..=0xf => 256 * (1 << (block_size_enc - 8)),
        _ => {
            return decode_error("flac: block size set to reserved value");
        }
    };

    let sample_rate = match sample_rate_enc {
        0x0 => None, // Get from StreamInfo if possible.
        0x1 => Some(88_200),
        0x2 => Some(176_400),
        0x3 => Some(192_000),
        0x4 => Some(8_000),
        0x5 => Some(16_000),
        0x6 => Some(22_050),
        0x7 => Some(24_000),
        0x8 => Some(32_000),
        0x9 => Some(44_100),
        0xa => Some(48_000),
        0xb => Some(96_000),
        0xc => Some(u32::from(reader_crc8.read_u8()?) * 1000),
        0xd => Some(u32::from(reader_crc8.read_be_u16()?)),
        0xe => Some(u32::from(reader_crc8.read_be_u16()?) * 10),
        _ => {
            return decode_error("flac: sample rate set to reserved value");
        }
    };

    if let Some(rate) = sample_rate {
        if rate < 1 || rate > 655_350 {
            return decode_error("flac: sample rate out of bounds");
        }
    }

    let bits_per_sample = match bits_per_sample_enc {
        0x0 => None, // Get from StreamInfo if possible.
        0x1 => Some(8),
        0x2 => Some(12),
        0x4 => Some(16),
        0x5 => Some(20),
        0x6 => Some(24),
        0x7 => Some(32),
        _ => {
            return decode_error("flac: bits per sample set to reserved value");
        }
    };

    let channel_assignment = match channels_enc {
        0x0..=0x7 => ChannelAssignment::Independent(channels_enc + 1),
        0x8 => ChannelAssignment::LeftSide,
        0x9 => ChannelAssignment::RightSide,
        0xa => ChannelAssignment::MidSide,
        _ => {
            return decode_error("flac: channel assignment set to reserved value");
        }
    };

    // End of frame header, pop off CRC8 checksum.
    let crc8_computed = reader_crc8.checksum().crc();

    // Get expected CRC8 checksum from the header.
    let crc8_expected = reader_crc8.into_inner().read_u8()?;

    if crc8_expected != crc8_computed {
        return decode_error("flac: computed frame header CRC does not match expected CRC");
    }

    Ok(FrameHeader {
        blocking_strategy,
        block_sequence,
        block_num_samples,
        channel_assignment,
        bits_per_sample,
        sample_rate,
    })
}

/// Decodes a big-endian unsigned integer encoded via extended UTF8. In this context, extended
/// UTF8 simply means the encoded UTF8 value may be up to 7 bytes for a maximum integer bit
/// width of 36-bits.
fn utf8_decode_be_u64<B: ReadBytes>(src: &mut B) -> Result<Option<u64>> {
    // Read the first byte of the UTF8 encoded integer.
    let mut state = u64::from(src.read_u8()?);

    // UTF8 prefixes 1s followed by a 0 to indicate the total number of bytes within the
    // multi-byte sequence. Using ranges, determine the mask that will overlap the data bits
    // within the first byte of the sequence. For values 0-127, return the value immediately.
    // If the value falls out of range return None as this is either not the start of a UTF8
    // sequence or the prefix is incorrect.
    let mask: u8 = match state {
        0x00..=0x7f => return Ok(Some(state)),
        0xc0..=0xdf => 0x1f,
        0xe0..=0xef => 0x0f,
        0xf0..=0xf7 => 0x07,
        0xf8..=0xfb => 0x03,
        0xfc..=0xfd => 0x01,
        0xfe => 0x00,
        _ => return Ok(None),
    };

    // Obtain the data bits from the first byte by using the data mask.
    state &= u64::from(mask);

    // Read the remaining bytes within the UTF8 sequence. Since the mask 0s out the UTF8 prefix
    // of 1s which indicate the length of the multi-byte sequence in bytes, plus an additional 0
    // bit, the number of remaining bytes to read is the number of zeros in the mask minus 2.
    for _ in 2..mask.leading_zeros() {
        let byte = src.read_u8()?;

        // Every continuation byte is prefixed 0b10xx_xxxx.
        if byte & 0xc0 != 0x80 {
            return Ok(None);
        }

        state = (state << 6) | u64::from(byte & 0x3f);
    }

    // The smallest value representable by a sequence of each length. A decoded value below the
    // minimum for its sequence length is an over-long encoding and must be rejected.
    let min = match mask.leading_zeros() {
        3 => 0x80,
        4 => 0x800,
        5 => 0x1_0000,
        6 => 0x20_0000,
        7 => 0x400_0000,
        _ => 0x8000_0000,
    };

    if state < min {
        return Ok(None);
    }

    Ok(Some(state))
}

/// Encodes a value of up-to 36-bits with the extended UTF8 scheme used for frame and sample
/// sequence numbers.
pub fn utf8_encode_be_u64(bw: &mut BitWriter, value: u64) {
    debug_assert!(value <= 0x000f_ffff_ffff);

    // The number of continuation bytes required, each carrying 6 data bits. The leading byte
    // carries 7 data bits when alone, and (6 - n) data bits when followed by n continuation
    // bytes, except the 7-byte form whose leading byte 0xfe carries none.
    if value < 0x80 {
        bw.write_bits_leq32(value as u32, 8);
    }
    else if value < 0x800 {
        bw.write_bits_leq32(0xc0 | (value >> 6) as u32, 8);
        bw.write_bits_leq32(0x80 | (value & 0x3f) as u32, 8);
    }
    else if value < 0x1_0000 {
        bw.write_bits_leq32(0xe0 | (value >> 12) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 6) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | (value & 0x3f) as u32, 8);
    }
    else if value < 0x20_0000 {
        bw.write_bits_leq32(0xf0 | (value >> 18) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 12) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 6) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | (value & 0x3f) as u32, 8);
    }
    else if value < 0x400_0000 {
        bw.write_bits_leq32(0xf8 | (value >> 24) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 18) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 12) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 6) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | (value & 0x3f) as u32, 8);
    }
    else if value < 0x8000_0000 {
        bw.write_bits_leq32(0xfc | (value >> 30) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 24) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 18) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 12) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 6) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | (value & 0x3f) as u32, 8);
    }
    else {
        bw.write_bits_leq32(0xfe, 8);
        bw.write_bits_leq32(0x80 | ((value >> 30) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 24) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 18) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 12) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | ((value >> 6) & 0x3f) as u32, 8);
        bw.write_bits_leq32(0x80 | (value & 0x3f) as u32, 8);
    }
}

/// The 4-bit block size code for a block length plus the tail field it demands, if any.
fn block_len_code(block_len: u16) -> (u32, Option<(u32, u32)>) {
    match block_len {
        192 => (0x1, None),
        576 => (0x2, None),
        1152 => (0x3, None),
        2304 => (0x4, None),
        4608 => (0x5, None),
        256 => (0x8, None),
        512 => (0x9, None),
        1024 => (0xa, None),
        2048 => (0xb, None),
        4096 => (0xc, None),
        8192 => (0xd, None),
        16384 => (0xe, None),
        32768 => (0xf, None),
        len if len <= 256 => (0x6, Some((u32::from(len) - 1, 8))),
        len => (0x7, Some((u32::from(len) - 1, 16))),
    }
}

/// The 4-bit sample rate code for a rate plus the tail field it demands, if any. Code 0 defers
/// to the stream information block.
fn sample_rate_code(rate: u32) -> (u32, Option<(u32, u32)>) {
    match rate {
        88_200 => (0x1, None),
        176_400 => (0x2, None),
        192_000 => (0x3, None),
        8_000 => (0x4, None),
        16_000 => (0x5, None),
        22_050 => (0x6, None),
        24_000 => (0x7, None),
        32_000 => (0x8, None),
        44_100 => (0x9, None),
        48_000 => (0xa, None),
        96_000 => (0xb, None),
        rate if rate % 1000 == 0 && rate / 1000 <= 255 => (0xc, Some((rate / 1000, 8))),
        rate if rate <= 65_535 => (0xd, Some((rate, 16))),
        rate if rate % 10 == 0 && rate / 10 <= 65_535 => (0xe, Some((rate / 10, 16))),
        _ => (0x0, None),
    }
}

/// The 3-bit sample size code for a bit depth. Code 0 defers to the stream information block.
fn bits_per_sample_code(bps: u32) -> u32 {
    match bps {
        8 => 0x1,
        12 => 0x2,
        16 => 0x4,
        20 => 0x5,
        24 => 0x6,
        32 => 0x7,
        _ => 0x0,
    }
}

/// Writes a complete frame header, including the trailing CRC-8, into `bw`. The writer must be
/// empty or byte-aligned at the start of the frame; the CRC-8 is computed over the bytes
/// written since `frame_start`.
pub fn write_frame_header(
    bw: &mut BitWriter,
    frame_start: usize,
    frame_number: u64,
    block_len: u16,
    sample_rate: u32,
    bits_per_sample: u32,
    channel_assignment: ChannelAssignment,
) {
    debug_assert!(bw.is_aligned());

    let (block_len_enc, block_len_tail) = block_len_code(block_len);
    let (sample_rate_enc, sample_rate_tail) = sample_rate_code(sample_rate);

    // 14-bit sync code, reserved bit, and the fixed blocking strategy bit.
    bw.write_bits_leq32(0b1111_1111_1111_10, 14);
    bw.write_bit(false);
    bw.write_bit(false);

    bw.write_bits_leq32(block_len_enc, 4);
    bw.write_bits_leq32(sample_rate_enc, 4);
    bw.write_bits_leq32(channel_assignment.code(), 4);
    bw.write_bits_leq32(bits_per_sample_code(bits_per_sample), 3);
    bw.write_bit(false);

    utf8_encode_be_u64(bw, frame_number);

    if let Some((value, width)) = block_len_tail {
        bw.write_bits_leq32(value, width);
    }

    if let Some((value, width)) = sample_rate_tail {
        bw.write_bits_leq32(value, width);
    }

    // Every field so far is a whole number of bits totalling a whole number of bytes.
    debug_assert!(bw.is_aligned());

    let mut crc8 = Crc8Ccitt::new(0);
    crc8.update(&bw.written()[frame_start..]);

    bw.write_bits_leq32(u32::from(crc8.crc()), 8);
}
