// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::path::Path;

use carillon_core::errors::Error;

use carillon_flac::meta::{
    Application, MetadataBlock, MetadataBlockType, MetadataChain, Padding, SimpleIterator,
    VorbisComment,
};
use carillon_flac::EncoderOptions;

use common::{decode, encode, noise};

/// A comment block whose body is exactly `body_len` bytes.
fn comment_of_len(body_len: usize) -> VorbisComment {
    let mut comment = VorbisComment::new("");

    // Body layout: 4 (vendor len) + 0 (vendor) + 4 (count) + 4 (entry len) + entry.
    let entry_len = body_len - 12;
    let value = "x".repeat(entry_len - 2);

    comment.push("T", &value).unwrap();

    comment
}

/// Writes a small FLAC file whose metadata is stream-info, `blocks`, then audio, and returns
/// its contents together with the decoded reference signal.
fn write_test_file(path: &Path, blocks: Vec<MetadataBlock>) -> (Vec<u8>, Vec<i32>) {
    let signal = noise(4096, 16, 21);

    let options = EncoderOptions { metadata: blocks, ..EncoderOptions::new(1, 16, 44_100) };
    let (bytes, _) = encode(options, &[signal.clone()].to_vec());

    std::fs::write(path, &bytes).unwrap();

    (bytes, signal)
}

fn assert_audio_intact(path: &Path, signal: &[i32]) {
    let bytes = std::fs::read(path).unwrap();
    let (sink, verdict) = decode(bytes, Default::default(), 1);

    verdict.unwrap();
    assert!(sink.issues.is_empty());
    assert_eq!(sink.channels[0], signal);
}

#[test]
fn verify_chain_rewrite_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.flac");

    let (original, _) = write_test_file(
        &path,
        vec![MetadataBlock::Padding(Padding { len: 128 })],
    );

    let mut chain = MetadataChain::read_path(&path).unwrap();
    chain.write_path(&path, true, true).unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), original);
}

#[test]
fn verify_chain_in_place_edit_reuses_padding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edit.flac");

    // Stream-info, 1024 bytes of padding, then a 200-byte comment block.
    let (original, signal) = write_test_file(
        &path,
        vec![
            MetadataBlock::Padding(Padding { len: 1024 }),
            MetadataBlock::VorbisComment(comment_of_len(200)),
        ],
    );

    let file_len = original.len() as u64;

    // Grow the comment to 350 bytes; the padding must absorb the 150 byte difference.
    let mut chain = MetadataChain::read_path(&path).unwrap();

    {
        let mut cursor = chain.cursor();

        while cursor.block().block_type() != MetadataBlockType::VorbisComment {
            assert!(cursor.next());
        }

        cursor.set_block(MetadataBlock::VorbisComment(comment_of_len(350))).unwrap();
    }

    chain.write_path(&path, true, true).unwrap();

    let edited = std::fs::read(&path).unwrap();

    // The file length is unchanged, the padding shrank by exactly the comment's growth, and
    // the audio region is byte-identical.
    assert_eq!(edited.len() as u64, file_len);

    let chain = MetadataChain::read_path(&path).unwrap();

    assert!(matches!(chain.blocks()[1], MetadataBlock::Padding(Padding { len: 874 })));

    let audio_start = 4 + chain.metadata_len() as usize;
    assert_eq!(edited[audio_start..], original[audio_start..]);

    assert_audio_intact(&path, &signal);
}

#[test]
fn verify_chain_full_rewrite_without_padding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grow.flac");

    let (_, signal) = write_test_file(&path, Vec::new());

    // With no padding to reuse, growth forces a whole-file rewrite, which must still preserve
    // the audio.
    let mut chain = MetadataChain::read_path(&path).unwrap();

    {
        let mut cursor = chain.cursor();
        cursor.insert_block_after(MetadataBlock::VorbisComment(comment_of_len(64))).unwrap();
    }

    chain.write_path(&path, true, true).unwrap();

    let chain = MetadataChain::read_path(&path).unwrap();
    assert_eq!(chain.len(), 2);

    assert_audio_intact(&path, &signal);
}

#[test]
fn verify_simple_iterator_walk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("walk.flac");

    write_test_file(
        &path,
        vec![
            MetadataBlock::VorbisComment(comment_of_len(100)),
            MetadataBlock::Padding(Padding { len: 64 }),
        ],
    );

    let mut iter = SimpleIterator::new(&path, true).unwrap();

    assert_eq!(iter.block_type(), MetadataBlockType::StreamInfo);
    assert!(!iter.is_last());

    assert!(iter.next().unwrap());
    assert_eq!(iter.block_type(), MetadataBlockType::VorbisComment);
    assert_eq!(iter.block_length(), 100);

    assert!(iter.next().unwrap());
    assert_eq!(iter.block_type(), MetadataBlockType::Padding);
    assert!(iter.is_last());
    assert!(!iter.next().unwrap());

    // Walk backwards.
    assert!(iter.prev().unwrap());
    assert_eq!(iter.block_type(), MetadataBlockType::VorbisComment);
    assert!(iter.prev().unwrap());
    assert_eq!(iter.block_type(), MetadataBlockType::StreamInfo);
    assert!(!iter.prev().unwrap());

    // Read-only iterators refuse mutation.
    let block = MetadataBlock::Padding(Padding { len: 1 });
    assert!(matches!(iter.set_block(&block, true), Err(Error::NotWritable)));
}

#[test]
fn verify_simple_iterator_set_block_with_padding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("set.flac");

    let (original, signal) = write_test_file(
        &path,
        vec![
            MetadataBlock::VorbisComment(comment_of_len(100)),
            MetadataBlock::Padding(Padding { len: 256 }),
        ],
    );

    let mut iter = SimpleIterator::new(&path, false).unwrap();

    assert!(iter.next().unwrap());

    // Grow the comment into the following padding: the file length must not change.
    iter.set_block(&MetadataBlock::VorbisComment(comment_of_len(180)), true).unwrap();

    let edited = std::fs::read(&path).unwrap();
    assert_eq!(edited.len(), original.len());

    let chain = MetadataChain::read_path(&path).unwrap();

    assert_eq!(chain.blocks()[1], MetadataBlock::VorbisComment(comment_of_len(180)));
    assert!(matches!(chain.blocks()[2], MetadataBlock::Padding(Padding { len: 176 })));

    assert_audio_intact(&path, &signal);
}

#[test]
fn verify_simple_iterator_insert_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("insert.flac");

    let (_, signal) = write_test_file(
        &path,
        vec![MetadataBlock::VorbisComment(comment_of_len(100))],
    );

    let app = MetadataBlock::Application(Application {
        ident: *b"crln",
        data: vec![1, 2, 3, 4, 5, 6, 7, 8].into_boxed_slice(),
    });

    {
        let mut iter = SimpleIterator::new(&path, false).unwrap();

        // Insert after stream-info; no padding to reuse, so the tail shifts.
        iter.insert_block_after(&app, true).unwrap();
        assert_eq!(iter.block_type(), MetadataBlockType::Application);
    }

    let chain = MetadataChain::read_path(&path).unwrap();

    assert_eq!(chain.len(), 3);
    assert_eq!(chain.blocks()[1], app);

    assert_audio_intact(&path, &signal);

    {
        let mut iter = SimpleIterator::new(&path, false).unwrap();

        // Delete the application block, replacing it with padding of identical length.
        assert!(iter.next().unwrap());
        iter.delete_block(true).unwrap();
        assert_eq!(iter.block_type(), MetadataBlockType::StreamInfo);
    }

    let chain = MetadataChain::read_path(&path).unwrap();

    assert_eq!(chain.len(), 3);
    assert!(matches!(chain.blocks()[1], MetadataBlock::Padding(Padding { len: 12 })));

    assert_audio_intact(&path, &signal);

    {
        let mut iter = SimpleIterator::new(&path, false).unwrap();

        // Fully remove the comment block, shrinking the file.
        assert!(iter.next().unwrap());
        assert!(iter.next().unwrap());
        assert_eq!(iter.block_type(), MetadataBlockType::VorbisComment);

        iter.delete_block(false).unwrap();
    }

    let chain = MetadataChain::read_path(&path).unwrap();

    assert_eq!(chain.len(), 2);

    assert_audio_intact(&path, &signal);
}

#[test]
fn verify_update_metadata_in_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("update.flac");

    let (_, signal) = write_test_file(
        &path,
        vec![MetadataBlock::Padding(Padding { len: 512 })],
    );

    carillon_flac::meta::update_metadata_in_path(&path, |chain| {
        let mut comment = VorbisComment::new("carillon");
        comment.set("ALBUM", "Integration Tests")?;

        let mut cursor = chain.cursor();
        cursor.insert_block_after(MetadataBlock::VorbisComment(comment))
    })
    .unwrap();

    let chain = carillon_flac::meta::read_metadata_from_path(&path).unwrap();

    let comment = chain
        .blocks()
        .iter()
        .find_map(|block| match block {
            MetadataBlock::VorbisComment(comment) => Some(comment),
            _ => None,
        })
        .expect("comment was inserted");

    assert_eq!(comment.get("album"), Some("Integration Tests"));

    assert_audio_intact(&path, &signal);
}
