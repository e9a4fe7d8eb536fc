// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::io::{self, Cursor, Seek, Write};

use carillon_core::errors::Error;
use carillon_core::io::MediaSink;

use carillon_flac::meta::{MetadataBlock, Padding, VorbisComment};
use carillon_flac::{DecodeIssue, DecoderOptions, MetadataFilter, StreamEncoder};
use carillon_flac::EncoderOptions;

use common::{decode, encode, first_frame_offset, noise, reference_md5, sine};

fn md5_options() -> DecoderOptions {
    DecoderOptions { verify_md5: true, ..Default::default() }
}

#[test]
fn verify_mono_constant_signal() {
    // 4096 identical samples make a single frame with a constant subframe.
    let channels = vec![vec![1000i32; 4096]];

    let options = EncoderOptions::new(1, 16, 44_100);
    let (bytes, info) = encode(options, &channels);

    assert_eq!(info.n_samples, Some(4096));
    assert_eq!(info.md5, Some(reference_md5(&channels, 16)));

    // A constant frame is tiny: well under one byte per sample.
    assert!(bytes.len() < 512, "constant signal compressed to {} bytes", bytes.len());

    let (sink, verdict) = decode(bytes, md5_options(), 1);

    verdict.unwrap();
    assert!(sink.issues.is_empty());
    assert_eq!(sink.channels[0], channels[0]);
}

#[test]
fn verify_stereo_identical_channels() {
    // Identical left and right channels leave a zero side channel, so a joint stereo mode must
    // beat independent coding handily.
    let signal = sine(8192, 44_100, 1000.0, 20_000.0);
    let channels = vec![signal.clone(), signal];

    let joint = EncoderOptions::new(2, 16, 44_100);

    let independent =
        EncoderOptions { mid_side: false, ..EncoderOptions::new(2, 16, 44_100) };

    let (joint_bytes, _) = encode(joint, &channels);
    let (independent_bytes, _) = encode(independent, &channels);

    assert!(joint_bytes.len() < independent_bytes.len());

    let (sink, verdict) = decode(joint_bytes, md5_options(), 2);

    verdict.unwrap();
    assert_eq!(sink.channels[0], channels[0]);
    assert_eq!(sink.channels[1], channels[1]);
}

#[test]
fn verify_bit_depths_roundtrip() {
    for bps in [8u32, 12, 16, 20, 24] {
        let channels = vec![noise(6000, bps, 11), noise(6000, bps, 22)];

        let options = EncoderOptions::new(2, bps, 48_000);
        let (bytes, info) = encode(options, &channels);

        assert_eq!(info.md5, Some(reference_md5(&channels, bps)));

        let (sink, verdict) = decode(bytes, md5_options(), 2);

        verdict.unwrap();
        assert!(sink.issues.is_empty(), "bps {}: {:?}", bps, sink.issues);
        assert_eq!(sink.channels[0], channels[0], "bps {}", bps);
        assert_eq!(sink.channels[1], channels[1], "bps {}", bps);
    }

    // 4-bit samples cannot be described by a frame header alone, and full-scale 32-bit samples
    // cannot use the joint stereo modes; both still round-trip.
    for bps in [4u32, 32] {
        let channels = vec![noise(3000, bps, 33)];

        let options =
            EncoderOptions { streamable_subset: false, ..EncoderOptions::new(1, bps, 44_100) };

        let (bytes, _) = encode(options, &channels);
        let (sink, verdict) = decode(bytes, md5_options(), 1);

        verdict.unwrap();
        assert_eq!(sink.channels[0], channels[0], "bps {}", bps);
    }
}

#[test]
fn verify_block_len_bounds_roundtrip() {
    // The smallest legal block length.
    let channels = vec![noise(100, 16, 5)];

    let options =
        EncoderOptions { block_len: 16, ..EncoderOptions::new(1, 16, 8_000) };

    let (bytes, _) = encode(options, &channels);
    let (sink, _) = decode(bytes, md5_options(), 1);

    assert_eq!(sink.channels[0], channels[0]);

    // The largest legal block length is outside the streamable subset.
    let channels = vec![noise(70_000, 16, 6)];

    let options = EncoderOptions {
        block_len: 65_535,
        streamable_subset: false,
        ..EncoderOptions::new(1, 16, 96_000)
    };

    let (bytes, _) = encode(options, &channels);
    let (sink, verdict) = decode(bytes, md5_options(), 1);

    verdict.unwrap();
    assert_eq!(sink.channels[0], channels[0]);

    // An odd block length exercises the 8/16-bit tail fields of the frame header.
    let channels = vec![noise(3000, 16, 7)];

    let options = EncoderOptions { block_len: 1000, ..EncoderOptions::new(1, 16, 44_100) };

    let (bytes, _) = encode(options, &channels);
    let (sink, _) = decode(bytes, md5_options(), 1);

    assert_eq!(sink.channels[0], channels[0]);
}

#[test]
fn verify_compression_levels_roundtrip() {
    let channels = vec![
        sine(10_000, 44_100, 441.0, 12_000.0),
        sine(10_000, 44_100, 882.0, 9_000.0),
    ];

    for level in [0u32, 1, 2, 3, 5, 8] {
        let options = EncoderOptions::new(2, 16, 44_100).with_compression_level(level);

        let (bytes, _) = encode(options, &channels);
        let (sink, verdict) = decode(bytes, md5_options(), 2);

        verdict.unwrap();
        assert_eq!(sink.channels[0], channels[0], "level {}", level);
        assert_eq!(sink.channels[1], channels[1], "level {}", level);
    }
}

#[test]
fn verify_encoder_verify_path() {
    let channels = vec![noise(9000, 16, 17), sine(9000, 44_100, 220.0, 640.0)];

    let options = EncoderOptions {
        verify: true,
        do_escape_coding: true,
        ..EncoderOptions::new(2, 16, 44_100).with_compression_level(8)
    };

    let (bytes, _) = encode(options, &channels);
    let (sink, verdict) = decode(bytes, md5_options(), 2);

    verdict.unwrap();
    assert_eq!(sink.channels[0], channels[0]);
    assert_eq!(sink.channels[1], channels[1]);
}

#[test]
fn verify_corrupt_frame_is_detected() {
    let channels = vec![sine(16_384, 44_100, 330.0, 14_000.0)];

    let options = EncoderOptions::new(1, 16, 44_100);
    let (mut bytes, _) = encode(options, &channels);

    // Flip one bit in the middle of the audio region.
    let audio_start = first_frame_offset(&bytes) as usize;
    let target = audio_start + (bytes.len() - audio_start) / 2;
    bytes[target] ^= 0x10;

    let (sink, verdict) = decode(bytes, md5_options(), 1);

    // The corruption must surface as a frame error, or failing that, as an MD5 mismatch.
    let crc_failed = !sink.issues.is_empty();
    let md5_failed = matches!(verdict, Err(Error::Md5Mismatch));

    assert!(crc_failed || md5_failed);
}

#[test]
fn verify_truncated_stream() {
    let channels = vec![noise(8192, 16, 9)];

    let options = EncoderOptions { block_len: 1024, ..EncoderOptions::new(1, 16, 44_100) };
    let (bytes, _) = encode(options, &channels);

    // Cut the stream a handful of bytes into the first frame header.
    let audio_start = first_frame_offset(&bytes) as usize;
    let truncated = bytes[..audio_start + 7].to_vec();

    let (sink, _) = decode(truncated, DecoderOptions::default(), 1);

    assert!(sink.issues.contains(&DecodeIssue::LostSync));
    assert!(sink.channels[0].is_empty());

    // Cut inside a later frame: every complete frame decodes, nothing partial is delivered.
    let truncated = bytes[..bytes.len() - 40].to_vec();

    let (sink, _) = decode(truncated, DecoderOptions::default(), 1);

    assert!(sink.issues.contains(&DecodeIssue::LostSync));
    assert!(sink.channels[0].len() < channels[0].len());
    assert_eq!(sink.channels[0].len() % 1024, 0);
    assert_eq!(sink.channels[0][..], channels[0][..sink.channels[0].len()]);
}

/// A sink that refuses to seek, forcing the encoder's out-of-band finalization path.
struct UnseekableSink(Cursor<Vec<u8>>);

impl Write for UnseekableSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Seek for UnseekableSink {
    fn seek(&mut self, _: io::SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "sink does not support seeking"))
    }
}

impl MediaSink for UnseekableSink {
    fn is_seekable(&self) -> bool {
        false
    }
}

#[test]
fn verify_unseekable_sink_unknown_length() {
    let channels = vec![noise(5000, 16, 13)];

    let options = EncoderOptions::new(1, 16, 44_100);

    let mut encoder = StreamEncoder::try_new(UnseekableSink(Cursor::new(Vec::new())), options)
        .expect("encoder options are valid");

    encoder.process(&[&channels[0]]).unwrap();

    // The digest is reported out-of-band; the stream itself retains an unknown length and no
    // signature.
    let info = encoder.finish().unwrap();

    assert_eq!(info.n_samples, Some(5000));
    assert_eq!(info.md5, Some(reference_md5(&channels, 16)));

    let bytes = encoder.into_inner().0.into_inner();

    let (sink, verdict) = decode(bytes, md5_options(), 1);

    // A stream of unknown length must decode to end-of-stream without error, and MD5 checking
    // degrades to a no-op without a stored signature.
    verdict.unwrap();
    assert!(sink.issues.is_empty());
    assert_eq!(sink.channels[0], channels[0]);

    let stream_info = match &sink.blocks[0] {
        MetadataBlock::StreamInfo(info) => info.clone(),
        other => panic!("expected stream info, got {:?}", other),
    };

    assert_eq!(stream_info.n_samples, None);
    assert_eq!(stream_info.md5, None);
}

#[test]
fn verify_metadata_passthrough() {
    let mut comment = VorbisComment::new("carillon");
    comment.push("TITLE", "Roundtrip").unwrap();

    let metadata = vec![
        MetadataBlock::VorbisComment(comment.clone()),
        MetadataBlock::Padding(Padding { len: 0 }),
    ];

    let channels = vec![noise(2000, 16, 15)];

    let options = EncoderOptions { metadata, ..EncoderOptions::new(1, 16, 44_100) };
    let (bytes, _) = encode(options, &channels);

    let decoder_options = DecoderOptions {
        verify_md5: false,
        metadata_filter: MetadataFilter::respond_all(),
    };

    // A trailing zero-length padding block is legal and must be delivered too.
    let (sink, _) = decode(bytes, decoder_options, 1);

    assert_eq!(sink.blocks.len(), 3);
    assert_eq!(sink.blocks[1], MetadataBlock::VorbisComment(comment));
    assert_eq!(sink.blocks[2], MetadataBlock::Padding(Padding { len: 0 }));

    assert_eq!(sink.channels[0], channels[0]);
}

#[test]
fn verify_abort_from_sink() {
    use carillon_core::audio::AudioBuffer;
    use carillon_flac::{DecoderSink, FrameInfo, SinkAction, StreamDecoder};

    struct AbortSink;

    impl DecoderSink for AbortSink {
        fn audio(&mut self, _: &FrameInfo, _: &AudioBuffer) -> SinkAction {
            SinkAction::Abort
        }
    }

    let channels = vec![noise(4096, 16, 3)];
    let (bytes, _) = encode(EncoderOptions::new(1, 16, 44_100), &channels);

    let mut decoder =
        StreamDecoder::try_new(Box::new(Cursor::new(bytes)), Default::default()).unwrap();

    let mut sink = AbortSink;

    // The first frame aborts decoding; thereafter the decoder is terminal but queryable.
    assert!(!decoder.decode_frame(&mut sink).unwrap());
    assert_eq!(decoder.state(), carillon_flac::DecoderState::Aborted);
    assert!(decoder.stream_info().is_some());
    assert!(decoder.decode_frame(&mut sink).is_err());
}
