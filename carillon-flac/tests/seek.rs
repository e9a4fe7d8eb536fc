// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::io::Cursor;

use carillon_core::errors::Error;

use carillon_flac::meta::{MetadataBlock, SeekTable};
use carillon_flac::{DecoderOptions, EncoderOptions, StreamDecoder};

use common::{encode, noise, sine, CollectSink};

fn decoder_for(bytes: Vec<u8>) -> StreamDecoder {
    StreamDecoder::try_new(Box::new(Cursor::new(bytes)), DecoderOptions::default()).unwrap()
}

#[test]
fn verify_seek_with_seek_table() {
    let n = 16 * 1024;
    let channels = vec![sine(n, 44_100, 997.0, 15_000.0), sine(n, 44_100, 1507.0, 11_000.0)];

    // A seek table template with points spread over the stream; the encoder resolves them to
    // frame boundaries.
    let mut table = SeekTable::default();
    table.template_append_spaced_points(8, n as u64).unwrap();
    table.template_append_placeholders(2);

    let options = EncoderOptions {
        block_len: 1024,
        metadata: vec![MetadataBlock::SeekTable(table)],
        ..EncoderOptions::new(2, 16, 44_100)
    };

    let (bytes, _) = encode(options, &channels);

    // The emitted table must hold resolved, strictly increasing points on frame boundaries.
    let mut decoder = decoder_for(bytes);
    let mut sink = CollectSink::new(2);

    decoder.read_metadata(&mut sink).unwrap();

    let table = decoder.seek_table().expect("stream carries a seek table").clone();

    assert!(table.is_legal());
    assert!(table.points.iter().any(|p| !p.is_placeholder()));

    for point in table.points.iter().filter(|p| !p.is_placeholder()) {
        assert_eq!(point.sample_number % 1024, 0);
        assert_eq!(point.frame_samples, 1024);
    }

    // A seek to an arbitrary sample delivers exactly the remaining signal.
    let target = 5 * 1024 + 17;

    decoder.seek_to_sample(target as u64).unwrap();

    let mut sink = CollectSink::new(2);
    decoder.decode_all(&mut sink).unwrap();

    assert_eq!(sink.frames[0].first_sample, target as u64);
    assert_eq!(sink.channels[0], channels[0][target..]);
    assert_eq!(sink.channels[1], channels[1][target..]);
}

#[test]
fn verify_seek_without_seek_table() {
    // A fixed-blocksize stream with no table: seeking binary-searches frame headers.
    let block_len = 256usize;
    let n = 15 * block_len + 100;

    let channels = vec![noise(n, 16, 77)];

    let options = EncoderOptions {
        block_len: block_len as u32,
        ..EncoderOptions::new(1, 16, 44_100)
    };

    let (bytes, _) = encode(options, &channels);

    let mut decoder = decoder_for(bytes);
    let mut sink = CollectSink::new(1);

    decoder.read_metadata(&mut sink).unwrap();

    // Land 5 samples into the 11th frame: the first delivered frame starts mid-block.
    let target = 10 * block_len + 5;

    decoder.seek_to_sample(target as u64).unwrap();

    let mut sink = CollectSink::new(1);

    assert!(decoder.decode_frame(&mut sink).unwrap());

    assert_eq!(sink.frames[0].first_sample, target as u64);
    assert_eq!(sink.frames[0].block_len as usize, block_len - 5);
    assert_eq!(sink.channels[0], channels[0][target..11 * block_len]);

    // Decoding continues seamlessly to the end of the stream.
    decoder.decode_all(&mut sink).unwrap();
    assert_eq!(sink.channels[0], channels[0][target..]);
}

#[test]
fn verify_seek_unknown_stream_length() {
    // Unknown total length: in-range seeks still work, since bounds come from the byte length.
    let block_len = 512usize;
    let n = 8 * block_len;

    let channels = vec![sine(n, 8_000, 60.0, 900.0)];

    let options = EncoderOptions {
        block_len: block_len as u32,
        ..EncoderOptions::new(1, 16, 8_000)
    };

    let sink = std::io::Cursor::new(Vec::new());
    let mut encoder = carillon_flac::StreamEncoder::try_new(sink, options).unwrap();
    encoder.process(&[&channels[0]]).unwrap();
    encoder.finish().unwrap();

    let mut bytes = encoder.into_inner().into_inner();

    // Rewrite the stream information block with an unknown total sample count.
    {
        use carillon_flac::meta::MetadataChain;

        let mut reader = carillon_core::io::MediaSourceStream::new(
            Box::new(Cursor::new(bytes.clone())),
            Default::default(),
        );

        let mut chain = MetadataChain::read(&mut reader).unwrap();

        let mut cursor = chain.cursor();

        let mut info = match cursor.block() {
            MetadataBlock::StreamInfo(info) => info.clone(),
            _ => unreachable!(),
        };

        info.n_samples = None;

        cursor.set_block(MetadataBlock::StreamInfo(info)).unwrap();

        let mut rewritten = Vec::new();
        chain.write_to(&mut rewritten).unwrap();

        bytes.splice(..rewritten.len(), rewritten);
    }

    let mut decoder = decoder_for(bytes);
    let mut sink = CollectSink::new(1);

    decoder.read_metadata(&mut sink).unwrap();

    assert_eq!(decoder.stream_info().unwrap().n_samples, None);

    let target = 3 * block_len + 11;

    decoder.seek_to_sample(target as u64).unwrap();

    let mut sink = CollectSink::new(1);
    decoder.decode_all(&mut sink).unwrap();

    assert_eq!(sink.channels[0], channels[0][target..]);
}

#[test]
fn verify_seek_out_of_range() {
    let channels = vec![noise(4096, 16, 5)];

    let (bytes, _) = encode(EncoderOptions::new(1, 16, 44_100), &channels);

    let mut decoder = decoder_for(bytes);
    let mut sink = CollectSink::new(1);

    decoder.read_metadata(&mut sink).unwrap();

    assert!(matches!(decoder.seek_to_sample(4096), Err(Error::SeekError(_))));
    assert!(matches!(decoder.seek_to_sample(1 << 40), Err(Error::SeekError(_))));

    // An in-range seek still succeeds afterwards.
    decoder.seek_to_sample(4095).unwrap();

    let mut sink = CollectSink::new(1);
    decoder.decode_all(&mut sink).unwrap();

    assert_eq!(sink.channels[0], channels[0][4095..]);
}

#[test]
fn verify_seek_to_start() {
    let channels = vec![noise(3 * 1024, 16, 8)];

    let options = EncoderOptions { block_len: 1024, ..EncoderOptions::new(1, 16, 44_100) };
    let (bytes, _) = encode(options, &channels);

    let mut decoder = decoder_for(bytes);
    let mut sink = CollectSink::new(1);

    // Decode everything, then rewind to the very beginning.
    decoder.decode_all(&mut sink).unwrap();

    decoder.seek_to_sample(0).unwrap();

    let mut sink = CollectSink::new(1);
    decoder.decode_all(&mut sink).unwrap();

    assert_eq!(sink.channels[0], channels[0]);
}
