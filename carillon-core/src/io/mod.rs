// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements the byte- and bit-level input/output the codec is built on.
//!
//! Byte sources implement [`ReadBytes`], which requires only four primitives (bounded and
//! exact buffer reads, skipping, and position reporting); every fixed-width integer read is
//! derived from them. [`MediaSourceStream`] adapts an arbitrary [`MediaSource`] into a
//! buffered `ReadBytes` with bounded backwards seeking, [`BufReader`] reads from a byte
//! slice, [`ScopedStream`] bounds reads to a byte budget, and [`ChecksumReader`] taps reads
//! into a running [`Checksum`](crate::checksum::Checksum).
//!
//! [`BitWriter`] and [`BitReader`] provide the most-significant-bit-first bit order FLAC
//! uses; no other bit order is supported.

use std::io;

use crate::errors::Result;

mod bit;
mod buf_reader;
mod checksum_reader;
mod media_source_stream;
mod scoped_stream;

pub use bit::{BitReader, BitWriter};
pub use buf_reader::BufReader;
pub use checksum_reader::ChecksumReader;
pub use media_source_stream::{MediaSourceStream, MediaSourceStreamOptions};
pub use scoped_stream::ScopedStream;

/// `MediaSource` is a composite trait of [`std::io::Read`] and [`std::io::Seek`]. A source
/// *must* implement this trait to be used by [`MediaSourceStream`].
///
/// Despite requiring the [`std::io::Seek`] trait, seeking is an optional capability that can
/// be queried at runtime.
pub trait MediaSource: io::Read + io::Seek + Send + Sync {
    /// Returns if the source is seekable. This may be an expensive operation.
    fn is_seekable(&self) -> bool;

    /// Returns the length in bytes, if available. This may be an expensive operation.
    fn byte_len(&self) -> Option<u64>;
}

impl MediaSource for std::fs::File {
    /// Returns if the `std::fs::File` backing the `MediaSource` is seekable.
    ///
    /// Note: This operation involves querying the underlying file descriptor for information
    /// and may be moderately expensive. Therefore it is recommended to cache this value if
    /// used often.
    fn is_seekable(&self) -> bool {
        // If the file's metadata is available, and the file is a regular file (i.e., not a
        // FIFO, etc.), then the MediaSource will be seekable. Otherwise assume it is not.
        // Note that metadata() follows symlinks.
        match self.metadata() {
            Ok(metadata) => metadata.is_file(),
            _ => false,
        }
    }

    /// Returns the length in bytes of the `std::fs::File` backing the `MediaSource`.
    fn byte_len(&self) -> Option<u64> {
        match self.metadata() {
            Ok(metadata) => Some(metadata.len()),
            _ => None,
        }
    }
}

impl<T: AsRef<[u8]> + Send + Sync> MediaSource for io::Cursor<T> {
    /// Always returns true since a `io::Cursor<u8>` is always seekable.
    fn is_seekable(&self) -> bool {
        true
    }

    /// Returns the length in bytes of the `io::Cursor<u8>` backing the `MediaSource`.
    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

/// `ReadOnlySource` wraps any source implementing [`std::io::Read`] in an unseekable
/// [`MediaSource`].
pub struct ReadOnlySource<R: io::Read> {
    inner: R,
}

impl<R: io::Read + Send + Sync> ReadOnlySource<R> {
    /// Instantiates a new `ReadOnlySource<R>` by taking ownership and wrapping the provided
    /// `Read`er.
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner }
    }

    /// Unwraps this `ReadOnlySource<R>`, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read + Send + Sync> MediaSource for ReadOnlySource<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl<R: io::Read> io::Read for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: io::Read> io::Seek for ReadOnlySource<R> {
    fn seek(&mut self, _: io::SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "source does not support seeking"))
    }
}

/// `MediaSink` is the write-side dual of [`MediaSource`]: a composite trait of
/// [`std::io::Write`] and [`std::io::Seek`] for byte sinks an encoder may emit into.
///
/// Seeking is an optional capability. When a sink is not seekable the encoder cannot rewrite
/// the stream information block at finalization, and the final stream information must be
/// obtained out-of-band instead.
pub trait MediaSink: io::Write + io::Seek + Send + Sync {
    /// Returns if the sink is seekable. This may be an expensive operation.
    fn is_seekable(&self) -> bool;
}

impl MediaSink for std::fs::File {
    fn is_seekable(&self) -> bool {
        match self.metadata() {
            Ok(metadata) => metadata.is_file(),
            _ => false,
        }
    }
}

impl MediaSink for io::Cursor<Vec<u8>> {
    fn is_seekable(&self) -> bool {
        true
    }
}

impl MediaSink for io::Cursor<&mut Vec<u8>> {
    fn is_seekable(&self) -> bool {
        true
    }
}

/// `ReadBytes` is the byte-reading interface of the codec.
///
/// Implementors provide the four primitive operations; the fixed-width big- and little-endian
/// integer reads are all expressed in terms of [`read_buf_exact`](ReadBytes::read_buf_exact),
/// so a wrapper that intercepts the primitives observes every byte read through the derived
/// methods as well.
pub trait ReadBytes {
    /// Reads up-to enough bytes to fill `buf`, returning how many were read. Reading nothing
    /// at all is an error.
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Fills `buf` completely or returns an error.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Skips `count` bytes or returns an error.
    fn ignore_bytes(&mut self, count: u64) -> Result<()>;

    /// Gets the position of the stream.
    fn pos(&self) -> u64;

    /// Reads a single unsigned byte.
    #[inline(always)]
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_buf_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads four bytes and returns them in read-order.
    #[inline(always)]
    fn read_quad_bytes(&mut self) -> Result<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.read_buf_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads an unsigned 16-bit big-endian integer.
    #[inline(always)]
    fn read_be_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_buf_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Reads an unsigned 24-bit big-endian integer.
    #[inline(always)]
    fn read_be_u24(&mut self) -> Result<u32> {
        let mut buf = [0u8; 3];
        self.read_buf_exact(&mut buf)?;
        Ok((u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2]))
    }

    /// Reads an unsigned 32-bit big-endian integer.
    #[inline(always)]
    fn read_be_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_quad_bytes()?))
    }

    /// Reads an unsigned 64-bit big-endian integer.
    #[inline(always)]
    fn read_be_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_buf_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Reads an unsigned 32-bit little-endian integer.
    #[inline(always)]
    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_quad_bytes()?))
    }

    /// Reads exactly `len` bytes and returns them as a boxed slice.
    fn read_boxed_slice_exact(&mut self, len: usize) -> Result<Box<[u8]>> {
        let mut buf = vec![0u8; len];
        self.read_buf_exact(&mut buf)?;
        Ok(buf.into_boxed_slice())
    }
}
