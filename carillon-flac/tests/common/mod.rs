// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use std::io::Cursor;

use carillon_core::audio::AudioBuffer;
use carillon_core::errors::Result;

use carillon_flac::meta::{MetadataBlock, StreamInfo};
use carillon_flac::{
    DecodeIssue, DecoderOptions, DecoderSink, EncoderOptions, FrameInfo, SinkAction,
    StreamDecoder, StreamEncoder,
};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// A sink collecting everything the decoder produces.
pub struct CollectSink {
    pub channels: Vec<Vec<i32>>,
    pub blocks: Vec<MetadataBlock>,
    pub issues: Vec<DecodeIssue>,
    pub frames: Vec<FrameInfo>,
}

impl CollectSink {
    pub fn new(n_channels: usize) -> CollectSink {
        CollectSink {
            channels: vec![Vec::new(); n_channels],
            blocks: Vec::new(),
            issues: Vec::new(),
            frames: Vec::new(),
        }
    }
}

impl DecoderSink for CollectSink {
    fn metadata(&mut self, block: &MetadataBlock) {
        self.blocks.push(block.clone());
    }

    fn audio(&mut self, frame: &FrameInfo, buf: &AudioBuffer) -> SinkAction {
        self.frames.push(*frame);

        for (ch, samples) in self.channels.iter_mut().enumerate() {
            samples.extend_from_slice(buf.chan(ch));
        }

        SinkAction::Continue
    }

    fn error(&mut self, issue: DecodeIssue) {
        self.issues.push(issue);
    }
}

/// Encodes planar channels into an in-memory FLAC stream, returning the bytes and the final
/// stream information.
pub fn encode(options: EncoderOptions, channels: &[Vec<i32>]) -> (Vec<u8>, StreamInfo) {
    let sink = Cursor::new(Vec::new());
    let mut encoder = StreamEncoder::try_new(sink, options).expect("encoder options are valid");

    let refs: Vec<&[i32]> = channels.iter().map(|c| c.as_slice()).collect();

    encoder.process(&refs).expect("encoding failed");
    let info = encoder.finish().expect("finish failed");

    (encoder.into_inner().into_inner(), info)
}

/// Decodes an in-memory FLAC stream completely. Returns the collected output and the verdict
/// of the decoder's finish (MD5) check.
pub fn decode(bytes: Vec<u8>, options: DecoderOptions, n_channels: usize) -> (CollectSink, Result<()>) {
    let mut decoder = StreamDecoder::try_new(Box::new(Cursor::new(bytes)), options)
        .expect("decoder creation cannot fail");

    let mut sink = CollectSink::new(n_channels);

    decoder.decode_all(&mut sink).expect("decoding failed");
    let verdict = decoder.finish();

    (sink, verdict)
}

/// A sine of the given frequency and amplitude sampled at `rate`.
pub fn sine(n: usize, rate: u32, frequency: f64, amplitude: f64) -> Vec<i32> {
    (0..n)
        .map(|i| {
            let t = i as f64 / f64::from(rate);
            (amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin()) as i32
        })
        .collect()
}

/// Uniform pseudo-random noise spanning the full range of `bps`-bit samples.
pub fn noise(n: usize, bps: u32, seed: u64) -> Vec<i32> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let max = 1i64 << (bps - 1);

    (0..n).map(|_| rng.gen_range(-max..max) as i32).collect()
}

/// The little-endian packed MD5 signature of planar channels, computed independently of the
/// codec.
pub fn reference_md5(channels: &[Vec<i32>], bps: u32) -> [u8; 16] {
    use carillon_core::checksum::{Checksum, Md5};

    let bytes_per_sample = ((bps + 7) / 8) as usize;
    let n = channels[0].len();

    let mut md5 = Md5::default();

    for i in 0..n {
        for channel in channels {
            md5.update(&channel[i].to_le_bytes()[..bytes_per_sample]);
        }
    }

    md5.md5()
}

/// The byte offset of the first audio frame of an in-memory FLAC stream.
pub fn first_frame_offset(bytes: &[u8]) -> u64 {
    let mut reader = carillon_core::io::MediaSourceStream::new(
        Box::new(Cursor::new(bytes.to_vec())),
        Default::default(),
    );

    let chain = carillon_flac::meta::MetadataChain::read(&mut reader).expect("valid stream");

    4 + chain.metadata_len()
}
