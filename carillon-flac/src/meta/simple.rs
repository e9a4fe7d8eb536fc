// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A single-block metadata editing interface: the file is walked one block at a time without
//! loading the whole chain, and individual blocks are replaced, inserted, or deleted in place,
//! reusing neighbouring padding to avoid rewriting the audio whenever possible.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use carillon_core::errors::{decode_error, metadata_error, Error, Result};
use carillon_core::io::BufReader;

use crate::format::STREAM_MARKER;

use super::block::{
    MetadataBlock, MetadataBlockHeader, MetadataBlockType, BLOCK_HEADER_LEN,
};

/// The first metadata block always follows the 4-byte stream marker.
const FIRST_BLOCK_OFFSET: u64 = 4;

/// A forward/backward iterator over the metadata blocks of a FLAC file on disk.
pub struct SimpleIterator {
    file: File,
    read_only: bool,
    /// The byte offset of the current block's header.
    offset: u64,
    header: MetadataBlockHeader,
}

impl SimpleIterator {
    /// Opens the file at `path` and positions the iterator at the stream information block.
    ///
    /// In read-write mode the file is opened writable; [`Error::NotWritable`] is returned when
    /// that is denied.
    pub fn new<P: AsRef<Path>>(path: P, read_only: bool) -> Result<SimpleIterator> {
        let file = if read_only {
            File::open(path)?
        }
        else {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => file,
                Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                    return Err(Error::NotWritable);
                }
                Err(err) => return Err(err.into()),
            }
        };

        let mut iter = SimpleIterator {
            file,
            read_only,
            offset: FIRST_BLOCK_OFFSET,
            header: MetadataBlockHeader {
                is_last: false,
                block_type: MetadataBlockType::StreamInfo,
                block_len: 0,
            },
        };

        let mut marker = [0u8; 4];
        iter.file.rewind()?;
        iter.file.read_exact(&mut marker)?;

        if marker != STREAM_MARKER {
            return decode_error("flac: missing flac stream marker");
        }

        iter.header = iter.read_header_at(FIRST_BLOCK_OFFSET)?;

        if iter.header.block_type != MetadataBlockType::StreamInfo {
            return decode_error("flac: first block is not stream info");
        }

        Ok(iter)
    }

    /// The type of the current block.
    pub fn block_type(&self) -> MetadataBlockType {
        self.header.block_type
    }

    /// The body length of the current block in bytes.
    pub fn block_length(&self) -> u32 {
        self.header.block_len
    }

    /// True if the current block is the last in the chain.
    pub fn is_last(&self) -> bool {
        self.header.is_last
    }

    /// The byte offset of the current block's header.
    pub fn block_offset(&self) -> u64 {
        self.offset
    }

    /// Advances to the next block. Returns false when the current block is the last.
    pub fn next(&mut self) -> Result<bool> {
        if self.header.is_last {
            return Ok(false);
        }

        let offset = self.offset + u64::from(BLOCK_HEADER_LEN) + u64::from(self.header.block_len);

        self.header = self.read_header_at(offset)?;
        self.offset = offset;

        Ok(true)
    }

    /// Retreats to the previous block by rescanning from the head of the chain. Returns false
    /// when the current block is the stream information block.
    pub fn prev(&mut self) -> Result<bool> {
        if self.offset == FIRST_BLOCK_OFFSET {
            return Ok(false);
        }

        let target = self.offset;

        let mut offset = FIRST_BLOCK_OFFSET;
        let mut header = self.read_header_at(offset)?;

        loop {
            let next = offset + u64::from(BLOCK_HEADER_LEN) + u64::from(header.block_len);

            if next == target {
                break;
            }

            if header.is_last || next > target {
                return metadata_error("flac: metadata chain is inconsistent");
            }

            header = self.read_header_at(next)?;
            offset = next;
        }

        self.header = header;
        self.offset = offset;

        Ok(true)
    }

    /// Reads and parses the current block.
    pub fn read_block(&mut self) -> Result<MetadataBlock> {
        let mut body = vec![0u8; self.header.block_len as usize];

        self.file.seek(SeekFrom::Start(self.offset + u64::from(BLOCK_HEADER_LEN)))?;
        self.file.read_exact(&mut body)?;

        MetadataBlock::read(&mut BufReader::new(&body), &self.header)
    }

    /// Replaces the current block with `block`.
    ///
    /// With `use_padding`, a change in length is absorbed by merging with a directly following
    /// padding block, or by appending new padding when shrinking, so only this block's bytes
    /// are touched. Otherwise, or when padding cannot absorb the change, everything after the
    /// block is shifted.
    pub fn set_block(&mut self, block: &MetadataBlock, use_padding: bool) -> Result<()> {
        self.check_writable()?;

        if (self.offset == FIRST_BLOCK_OFFSET)
            != (block.block_type() == MetadataBlockType::StreamInfo)
        {
            return metadata_error("flac: stream info must be the first block and only the first");
        }

        let old_total = u64::from(BLOCK_HEADER_LEN) + u64::from(self.header.block_len);
        let new_total = block.total_len();

        if new_total == old_total {
            self.write_block_at(self.offset, block, self.header.is_last)?;
        }
        else if use_padding && self.try_set_with_padding(block, old_total, new_total)? {
            // Padding absorbed the length change.
        }
        else {
            // Shift the remainder of the file.
            let bytes = block_bytes(block, self.header.is_last)?;
            self.splice(self.offset, old_total, &bytes)?;
        }

        self.header = MetadataBlockHeader {
            is_last: self.header.is_last,
            block_type: block.block_type(),
            block_len: block.body_len(),
        };

        Ok(())
    }

    /// Inserts `block` after the current block and advances onto it.
    pub fn insert_block_after(&mut self, block: &MetadataBlock, use_padding: bool) -> Result<()> {
        self.check_writable()?;

        if block.block_type() == MetadataBlockType::StreamInfo {
            return metadata_error("flac: cannot insert a second stream info block");
        }

        let insert_at = self.offset + u64::from(BLOCK_HEADER_LEN) + u64::from(self.header.block_len);
        let new_total = block.total_len();

        let mut inserted_is_last = false;

        if use_padding && !self.header.is_last {
            let next = self.read_header_at(insert_at)?;

            if next.block_type == MetadataBlockType::Padding {
                let padding_total = u64::from(BLOCK_HEADER_LEN) + u64::from(next.block_len);

                if padding_total == new_total {
                    // The new block replaces the padding outright.
                    self.write_block_at(insert_at, block, next.is_last)?;
                    return self.step_onto(insert_at, block, next.is_last);
                }
                else if padding_total >= new_total + u64::from(BLOCK_HEADER_LEN) {
                    // The new block eats into the padding.
                    self.write_block_at(insert_at, block, false)?;

                    let shrunk = MetadataBlockHeader {
                        is_last: next.is_last,
                        block_type: MetadataBlockType::Padding,
                        block_len: (padding_total - new_total - u64::from(BLOCK_HEADER_LEN))
                            as u32,
                    };

                    self.write_header_at(insert_at + new_total, &shrunk)?;
                    self.zero_range(
                        insert_at + new_total + u64::from(BLOCK_HEADER_LEN),
                        u64::from(shrunk.block_len),
                    )?;

                    return self.step_onto(insert_at, block, false);
                }
            }
        }

        // No padding to reuse; shift the remainder of the file.
        if self.header.is_last {
            // The current block loses its last flag to the inserted block.
            let header = MetadataBlockHeader { is_last: false, ..copy_header(&self.header) };
            self.write_header_at(self.offset, &header)?;
            self.header.is_last = false;
            inserted_is_last = true;
        }

        let bytes = block_bytes(block, inserted_is_last)?;
        self.splice(insert_at, 0, &bytes)?;

        self.step_onto(insert_at, block, inserted_is_last)
    }

    /// Deletes the current block, or overwrites it with padding of identical total length, and
    /// retreats to the preceding block.
    pub fn delete_block(&mut self, use_padding: bool) -> Result<()> {
        self.check_writable()?;

        if self.offset == FIRST_BLOCK_OFFSET {
            return metadata_error("flac: cannot delete the stream info block");
        }

        if use_padding {
            let header = MetadataBlockHeader {
                is_last: self.header.is_last,
                block_type: MetadataBlockType::Padding,
                block_len: self.header.block_len,
            };

            self.write_header_at(self.offset, &header)?;
            self.zero_range(
                self.offset + u64::from(BLOCK_HEADER_LEN),
                u64::from(header.block_len),
            )?;
        }
        else {
            let total = u64::from(BLOCK_HEADER_LEN) + u64::from(self.header.block_len);

            if self.header.is_last {
                // The preceding block becomes the last; find and patch it before shifting.
                let target = self.offset;
                self.prev()?;

                let header = MetadataBlockHeader { is_last: true, ..copy_header(&self.header) };
                self.write_header_at(self.offset, &header)?;
                self.header.is_last = true;

                self.splice(target, total, &[])?;
                return Ok(());
            }

            self.splice(self.offset, total, &[])?;

            // The bytes of the following block now sit at the current offset; retreat to the
            // preceding block for a consistent cursor.
            let offset = self.offset;
            self.header = self.read_header_at(offset)?;
            self.offset = offset;
        }

        self.prev()?;

        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::NotWritable);
        }

        Ok(())
    }

    fn step_onto(&mut self, offset: u64, block: &MetadataBlock, is_last: bool) -> Result<()> {
        self.offset = offset;
        self.header = MetadataBlockHeader {
            is_last,
            block_type: block.block_type(),
            block_len: block.body_len(),
        };

        Ok(())
    }

    fn read_header_at(&mut self, offset: u64) -> Result<MetadataBlockHeader> {
        let mut bytes = [0u8; BLOCK_HEADER_LEN as usize];

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut bytes)?;

        MetadataBlockHeader::read(&mut BufReader::new(&bytes))
    }

    fn write_header_at(&mut self, offset: u64, header: &MetadataBlockHeader) -> Result<()> {
        let mut bytes = Vec::with_capacity(BLOCK_HEADER_LEN as usize);
        header.write(&mut bytes)?;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;

        Ok(())
    }

    fn write_block_at(&mut self, offset: u64, block: &MetadataBlock, is_last: bool) -> Result<()> {
        let bytes = block_bytes(block, is_last)?;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;

        Ok(())
    }

    fn zero_range(&mut self, offset: u64, len: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;

        let zeros = [0u8; 1024];
        let mut remaining = len;

        while remaining > 0 {
            let n = remaining.min(zeros.len() as u64) as usize;
            self.file.write_all(&zeros[..n])?;
            remaining -= n as u64;
        }

        Ok(())
    }

    /// Replaces the `remove` bytes at `offset` with `insert`, shifting everything after them
    /// and adjusting the file length.
    fn splice(&mut self, offset: u64, remove: u64, insert: &[u8]) -> Result<()> {
        let mut tail = Vec::new();

        self.file.seek(SeekFrom::Start(offset + remove))?;
        self.file.read_to_end(&mut tail)?;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(insert)?;
        self.file.write_all(&tail)?;

        let end = self.file.stream_position()?;
        self.file.set_len(end)?;

        Ok(())
    }

    /// Attempts to absorb a block length change with a neighbouring or new padding block.
    /// Returns true when the change was absorbed in place.
    fn try_set_with_padding(
        &mut self,
        block: &MetadataBlock,
        old_total: u64,
        new_total: u64,
    ) -> Result<bool> {
        let header_len = u64::from(BLOCK_HEADER_LEN);

        // Combine with a directly following padding block, if any.
        if !self.header.is_last {
            let next_offset = self.offset + old_total;
            let next = self.read_header_at(next_offset)?;

            if next.block_type == MetadataBlockType::Padding {
                let available = old_total + header_len + u64::from(next.block_len);

                if available == new_total {
                    // The block swallows the padding whole, and inherits its last flag.
                    self.write_block_at(self.offset, block, next.is_last)?;
                    self.header.is_last = next.is_last;
                    return Ok(true);
                }

                if available >= new_total + header_len {
                    self.write_block_at(self.offset, block, false)?;

                    let shrunk = MetadataBlockHeader {
                        is_last: next.is_last,
                        block_type: MetadataBlockType::Padding,
                        block_len: (available - new_total - header_len) as u32,
                    };

                    self.write_header_at(self.offset + new_total, &shrunk)?;
                    self.zero_range(
                        self.offset + new_total + header_len,
                        u64::from(shrunk.block_len),
                    )?;

                    self.header.is_last = false;
                    return Ok(true);
                }

                return Ok(false);
            }
        }

        // No following padding. A shrinking block can still leave new padding behind.
        if new_total + header_len <= old_total {
            self.write_block_at(self.offset, block, false)?;

            let padding = MetadataBlockHeader {
                is_last: self.header.is_last,
                block_type: MetadataBlockType::Padding,
                block_len: (old_total - new_total - header_len) as u32,
            };

            self.write_header_at(self.offset + new_total, &padding)?;
            self.zero_range(self.offset + new_total + header_len, u64::from(padding.block_len))?;

            self.header.is_last = false;
            return Ok(true);
        }

        Ok(false)
    }
}

fn copy_header(header: &MetadataBlockHeader) -> MetadataBlockHeader {
    MetadataBlockHeader {
        is_last: header.is_last,
        block_type: header.block_type,
        block_len: header.block_len,
    }
}

fn block_bytes(block: &MetadataBlock, is_last: bool) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(block.total_len() as usize);
    block.write_to(&mut bytes, is_last)?;
    Ok(bytes)
}
