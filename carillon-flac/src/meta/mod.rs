// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `meta` module models FLAC metadata blocks and provides two editing interfaces over
//! them: a [`SimpleIterator`] that touches one block of an open file at a time, and a
//! [`MetadataChain`] that owns every block of a file in memory and writes them back while
//! minimizing how much of the file is rewritten.

mod block;
mod chain;
mod simple;

pub use block::{
    Application, CueSheet, CueSheetTrack, CueSheetTrackIndex, MetadataBlock, MetadataBlockHeader,
    MetadataBlockType, Padding, Picture, SeekPoint, SeekTable, StreamInfo, UnknownBlock,
    VorbisComment, BLOCK_HEADER_LEN, SEEK_POINT_PLACEHOLDER,
};
pub use chain::{ChainCursor, MetadataChain};
pub use simple::SimpleIterator;

use std::path::Path;

use carillon_core::errors::Result;

/// Reads the complete metadata chain of the FLAC file at `path`.
pub fn read_metadata_from_path<P: AsRef<Path>>(path: P) -> Result<MetadataChain> {
    MetadataChain::read_path(path)
}

/// Applies `edit` to the metadata chain of the FLAC file at `path` and writes the chain back,
/// reusing padding to avoid rewriting the audio when possible.
pub fn update_metadata_in_path<P, F>(path: P, edit: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut MetadataChain) -> Result<()>,
{
    let mut chain = MetadataChain::read_path(&path)?;

    edit(&mut chain)?;

    chain.write_path(&path, true, true)
}
