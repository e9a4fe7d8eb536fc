// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A whole-chain metadata editing interface: every block of a file is loaded into memory,
//! mutated through a cursor, and written back with as little rewriting as the surrounding
//! padding allows.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use carillon_core::errors::{decode_error, metadata_error, Result};
use carillon_core::io::{MediaSourceStream, ReadBytes, ScopedStream};

use log::info;

use crate::format::STREAM_MARKER;

use super::block::{
    MetadataBlock, MetadataBlockHeader, MetadataBlockType, Padding, BLOCK_HEADER_LEN,
};

/// An ordered, owned, in-memory copy of a file's metadata blocks.
pub struct MetadataChain {
    blocks: Vec<MetadataBlock>,
    /// The byte length of the metadata section the chain was read from, headers included but
    /// not the stream marker.
    initial_len: u64,
}

impl MetadataChain {
    /// Reads a metadata chain from a stream positioned at the stream marker.
    pub fn read(reader: &mut MediaSourceStream) -> Result<MetadataChain> {
        let marker = reader.read_quad_bytes()?;

        if marker != STREAM_MARKER {
            return decode_error("flac: missing flac stream marker");
        }

        let mut blocks = Vec::new();
        let mut total_len = 0u64;

        loop {
            let header = MetadataBlockHeader::read(reader)?;

            total_len += u64::from(BLOCK_HEADER_LEN) + u64::from(header.block_len);

            // The first block must be stream information, and stream information must not
            // repeat.
            let is_stream_info = header.block_type == MetadataBlockType::StreamInfo;

            if blocks.is_empty() && !is_stream_info {
                return decode_error("flac: first block is not stream info");
            }

            if !blocks.is_empty() && is_stream_info {
                return decode_error("flac: found more than one stream info block");
            }

            // Bound the block read to the length stated in the header.
            let mut block_stream = ScopedStream::new(&mut *reader, u64::from(header.block_len));

            blocks.push(MetadataBlock::read(&mut block_stream, &header)?);

            // If the stated block length is longer than the number of bytes read by the block,
            // skip the remainder.
            let unread = block_stream.bytes_available();

            if unread > 0 {
                info!("under read block by {} bytes", unread);
                block_stream.ignore()?;
            }

            if header.is_last {
                break;
            }
        }

        Ok(MetadataChain { blocks, initial_len: total_len })
    }

    /// Reads the metadata chain of the file at `path`.
    pub fn read_path<P: AsRef<Path>>(path: P) -> Result<MetadataChain> {
        let file = std::fs::File::open(path)?;
        let mut reader = MediaSourceStream::new(Box::new(file), Default::default());

        MetadataChain::read(&mut reader)
    }

    pub fn blocks(&self) -> &[MetadataBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The byte length of the metadata section as it would be written now.
    pub fn metadata_len(&self) -> u64 {
        self.blocks.iter().map(|b| b.total_len()).sum()
    }

    /// A cursor over the chain, positioned at the stream information block.
    pub fn cursor(&mut self) -> ChainCursor<'_> {
        ChainCursor { chain: self, pos: 0 }
    }

    /// Coalesces every run of adjacent padding blocks into a single padding block. Idempotent.
    pub fn merge_padding(&mut self) {
        let mut i = 0;

        while i + 1 < self.blocks.len() {
            let absorb = match (&self.blocks[i], &self.blocks[i + 1]) {
                (MetadataBlock::Padding(_), MetadataBlock::Padding(next)) => {
                    // The merged block also absorbs the following block's header.
                    Some(next.len + BLOCK_HEADER_LEN)
                }
                _ => None,
            };

            match absorb {
                Some(extra) => {
                    if let MetadataBlock::Padding(padding) = &mut self.blocks[i] {
                        padding.len += extra;
                    }
                    self.blocks.remove(i + 1);
                }
                None => i += 1,
            }
        }
    }

    /// Moves all padding to the tail of the chain and merges it into one block. Idempotent.
    pub fn sort_padding(&mut self) {
        let mut total = 0u64;

        self.blocks.retain(|block| match block {
            MetadataBlock::Padding(padding) => {
                total += u64::from(padding.len) + u64::from(BLOCK_HEADER_LEN);
                false
            }
            _ => true,
        });

        if total > 0 {
            self.blocks.push(MetadataBlock::Padding(Padding {
                len: (total - u64::from(BLOCK_HEADER_LEN)) as u32,
            }));
        }
    }

    /// Writes the stream marker and every block to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.blocks.is_empty() {
            return metadata_error("flac: chain has no blocks");
        }

        writer.write_all(&STREAM_MARKER)?;

        let last = self.blocks.len() - 1;

        for (i, block) in self.blocks.iter().enumerate() {
            block.write_to(writer, i == last)?;
        }

        Ok(())
    }

    /// Writes the chain back to the file it was read from.
    ///
    /// With `use_padding`, the chain first tries to absorb any size difference into a trailing
    /// padding block so that only the metadata region needs rewriting. When that is not
    /// possible the whole file is rewritten, shifting the audio region. With
    /// `preserve_file_stats` the file's permissions are retained across a full rewrite.
    pub fn write_path<P: AsRef<Path>>(
        &mut self,
        path: P,
        use_padding: bool,
        preserve_file_stats: bool,
    ) -> Result<()> {
        if self.blocks.is_empty() {
            return metadata_error("flac: chain has no blocks");
        }

        let path = path.as_ref();

        if use_padding {
            self.absorb_length_delta();
        }

        let new_len = self.metadata_len();

        let mut file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(carillon_core::errors::Error::NotWritable);
            }
            Err(err) => return Err(err.into()),
        };

        if new_len == self.initial_len {
            // The chain still occupies its original span; rewrite the metadata region in
            // place, leaving the audio untouched.
            let mut marker = [0u8; 4];
            file.read_exact(&mut marker)?;

            if marker != STREAM_MARKER {
                return decode_error("flac: missing flac stream marker");
            }

            let last = self.blocks.len() - 1;

            for (i, block) in self.blocks.iter().enumerate() {
                block.write_to(&mut file, i == last)?;
            }

            file.flush()?;
        }
        else {
            // The metadata span changed; the whole file must be rewritten.
            let permissions =
                if preserve_file_stats { Some(file.metadata()?.permissions()) } else { None };

            let mut audio = Vec::new();
            file.seek(SeekFrom::Start(4 + self.initial_len))?;
            file.read_to_end(&mut audio)?;

            file.seek(SeekFrom::Start(0))?;
            self.write_to(&mut file)?;
            file.write_all(&audio)?;

            let end = file.stream_position()?;
            file.set_len(end)?;
            file.flush()?;

            if let Some(permissions) = permissions {
                std::fs::set_permissions(path, permissions)?;
            }
        }

        self.initial_len = new_len;

        Ok(())
    }

    /// Grows, shrinks, or removes a padding block so the chain's written length matches the
    /// length it was read with, when possible. The last padding block in the chain, wherever
    /// it sits, absorbs the difference.
    fn absorb_length_delta(&mut self) {
        let new_len = self.metadata_len();
        let old_len = self.initial_len;

        if new_len == old_len {
            return;
        }

        let padding_at =
            self.blocks.iter().rposition(|b| matches!(b, MetadataBlock::Padding(_)));

        if new_len < old_len {
            let slack = old_len - new_len;

            match padding_at {
                // Grow the padding.
                Some(i) => {
                    if let MetadataBlock::Padding(padding) = &mut self.blocks[i] {
                        padding.len =
                            (u64::from(padding.len) + slack).min(u64::from(u32::MAX)) as u32;
                    }
                }
                // No padding anywhere: append a trailing block if the slack fits a header.
                None if slack >= u64::from(BLOCK_HEADER_LEN) => {
                    self.blocks.push(MetadataBlock::Padding(Padding {
                        len: (slack - u64::from(BLOCK_HEADER_LEN)) as u32,
                    }));
                }
                None => (),
            }
        }
        else {
            let need = new_len - old_len;

            if let Some(i) = padding_at {
                let padding_len = match &self.blocks[i] {
                    MetadataBlock::Padding(padding) => u64::from(padding.len),
                    _ => unreachable!(),
                };

                if padding_len >= need {
                    // Shrink the padding.
                    if let MetadataBlock::Padding(padding) = &mut self.blocks[i] {
                        padding.len = (padding_len - need) as u32;
                    }
                }
                else if padding_len + u64::from(BLOCK_HEADER_LEN) == need {
                    // The padding exactly covers the growth: drop it entirely.
                    self.blocks.remove(i);
                }
            }
        }
    }
}

/// A mutating cursor over a [`MetadataChain`].
///
/// Blocks handed to `set_block` and the insert operations are consumed; the chain owns its
/// blocks outright. The stream information block can be replaced but never deleted or
/// displaced from the head of the chain.
pub struct ChainCursor<'a> {
    chain: &'a mut MetadataChain,
    pos: usize,
}

impl<'a> ChainCursor<'a> {
    /// The index of the current block.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The current block.
    pub fn block(&self) -> &MetadataBlock {
        &self.chain.blocks[self.pos]
    }

    /// Advances to the next block. Returns false at the end of the chain.
    pub fn next(&mut self) -> bool {
        if self.pos + 1 < self.chain.blocks.len() {
            self.pos += 1;
            true
        }
        else {
            false
        }
    }

    /// Retreats to the previous block. Returns false at the head of the chain.
    pub fn prev(&mut self) -> bool {
        if self.pos > 0 {
            self.pos -= 1;
            true
        }
        else {
            false
        }
    }

    /// Replaces the current block with `block`, consuming it. The head of the chain only
    /// accepts a stream information block, and no other position accepts one.
    pub fn set_block(&mut self, block: MetadataBlock) -> Result<()> {
        let is_stream_info = block.block_type() == MetadataBlockType::StreamInfo;

        if self.pos == 0 && !is_stream_info {
            return metadata_error("flac: first block must be stream info");
        }

        if self.pos != 0 && is_stream_info {
            return metadata_error("flac: stream info must be the first block");
        }

        self.chain.blocks[self.pos] = block;
        Ok(())
    }

    /// Inserts `block` before the current block and leaves the cursor on the inserted block.
    pub fn insert_block_before(&mut self, block: MetadataBlock) -> Result<()> {
        if self.pos == 0 {
            return metadata_error("flac: cannot insert before the stream info block");
        }

        if block.block_type() == MetadataBlockType::StreamInfo {
            return metadata_error("flac: cannot insert a second stream info block");
        }

        self.chain.blocks.insert(self.pos, block);
        Ok(())
    }

    /// Inserts `block` after the current block and advances the cursor onto it.
    pub fn insert_block_after(&mut self, block: MetadataBlock) -> Result<()> {
        if block.block_type() == MetadataBlockType::StreamInfo {
            return metadata_error("flac: cannot insert a second stream info block");
        }

        self.chain.blocks.insert(self.pos + 1, block);
        self.pos += 1;
        Ok(())
    }

    /// Deletes the current block, or replaces it with padding of identical total length, and
    /// leaves the cursor on the preceding block.
    pub fn delete_block(&mut self, replace_with_padding: bool) -> Result<()> {
        if self.pos == 0 {
            return metadata_error("flac: cannot delete the stream info block");
        }

        if replace_with_padding {
            let len = self.chain.blocks[self.pos].body_len();
            self.chain.blocks[self.pos] = MetadataBlock::Padding(Padding { len });
        }
        else {
            self.chain.blocks.remove(self.pos);
        }

        self.pos -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::block::{StreamInfo, VorbisComment};
    use super::*;

    fn stream_info_block() -> MetadataBlock {
        MetadataBlock::StreamInfo(StreamInfo {
            block_len_min: 4096,
            block_len_max: 4096,
            frame_byte_len_min: 0,
            frame_byte_len_max: 0,
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            n_samples: None,
            md5: None,
        })
    }

    fn chain_of(blocks: Vec<MetadataBlock>) -> MetadataChain {
        let initial_len = blocks.iter().map(|b| b.total_len()).sum();
        MetadataChain { blocks, initial_len }
    }

    #[test]
    fn verify_chain_roundtrip() {
        let chain = chain_of(vec![
            stream_info_block(),
            MetadataBlock::Padding(Padding { len: 64 }),
        ]);

        let mut bytes = Vec::new();
        chain.write_to(&mut bytes).unwrap();

        let cursor = std::io::Cursor::new(bytes.clone());
        let mut reader = MediaSourceStream::new(Box::new(cursor), Default::default());

        let chain_back = MetadataChain::read(&mut reader).unwrap();

        assert_eq!(chain_back.blocks(), chain.blocks());
        assert_eq!(chain_back.initial_len, chain.metadata_len());
    }

    #[test]
    fn verify_merge_and_sort_padding() {
        let mut chain = chain_of(vec![
            stream_info_block(),
            MetadataBlock::Padding(Padding { len: 10 }),
            MetadataBlock::Padding(Padding { len: 20 }),
            MetadataBlock::VorbisComment(VorbisComment::new("v")),
            MetadataBlock::Padding(Padding { len: 30 }),
        ]);

        let len_before = chain.metadata_len();

        chain.merge_padding();

        // 10 + 20 plus the absorbed header.
        assert_eq!(chain.len(), 4);
        assert!(matches!(chain.blocks()[1], MetadataBlock::Padding(Padding { len: 34 })));
        assert_eq!(chain.metadata_len(), len_before - 4);

        let merged = chain.metadata_len();
        chain.merge_padding();
        assert_eq!(chain.metadata_len(), merged);

        chain.sort_padding();

        assert_eq!(chain.len(), 3);
        assert!(matches!(chain.blocks()[2], MetadataBlock::Padding(Padding { len: 68 })));

        let sorted = chain.metadata_len();
        chain.sort_padding();
        assert_eq!(chain.metadata_len(), sorted);
    }

    #[test]
    fn verify_cursor_invariants() {
        let mut chain = chain_of(vec![
            stream_info_block(),
            MetadataBlock::VorbisComment(VorbisComment::new("v")),
            MetadataBlock::Padding(Padding { len: 8 }),
        ]);

        let mut cursor = chain.cursor();

        // The stream info block is protected.
        assert!(cursor.set_block(MetadataBlock::Padding(Padding { len: 1 })).is_err());
        assert!(cursor.insert_block_before(MetadataBlock::Padding(Padding { len: 1 })).is_err());
        assert!(cursor.delete_block(false).is_err());

        // A second stream info block is rejected anywhere else.
        assert!(cursor.next());
        assert!(cursor.set_block(stream_info_block()).is_err());
        assert!(cursor.insert_block_after(stream_info_block()).is_err());

        // Replace the comment with padding of identical length.
        let total = cursor.block().total_len();
        cursor.delete_block(true).unwrap();
        assert_eq!(cursor.pos(), 0);

        assert_eq!(chain.blocks()[1].total_len(), total);
        assert!(matches!(chain.blocks()[1], MetadataBlock::Padding(_)));
    }

    #[test]
    fn verify_absorb_length_delta() {
        // Shrinking metadata grows the trailing padding back to the original span.
        let mut chain = chain_of(vec![
            stream_info_block(),
            MetadataBlock::VorbisComment(VorbisComment::new("a vendor string")),
            MetadataBlock::Padding(Padding { len: 100 }),
        ]);

        let original = chain.initial_len;

        {
            let mut cursor = chain.cursor();
            cursor.next();
            cursor.set_block(MetadataBlock::VorbisComment(VorbisComment::new("v"))).unwrap();
        }

        chain.absorb_length_delta();
        assert_eq!(chain.metadata_len(), original);

        // Growing metadata shrinks the trailing padding.
        {
            let mut cursor = chain.cursor();
            cursor.next();
            cursor
                .set_block(MetadataBlock::VorbisComment(VorbisComment::new(
                    "a significantly longer vendor string than before",
                )))
                .unwrap();
        }

        chain.absorb_length_delta();
        assert_eq!(chain.metadata_len(), original);
    }
}
