// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::checksum::Checksum;
use crate::errors::Result;

use super::ReadBytes;

/// A `ChecksumReader` feeds every byte read from a borrowed inner stream into a running
/// [`Checksum`].
///
/// Since all of [`ReadBytes`]'s derived reads are funnelled through the two buffer
/// primitives, tapping those two is enough to observe everything. Skipped bytes, and anything
/// read from the inner stream directly via [`ChecksumReader::inner_mut`], bypass the
/// checksum; the FLAC frame decoder relies on both properties to keep a frame's own CRC
/// footer out of the computation.
pub struct ChecksumReader<'a, B: ReadBytes, C: Checksum> {
    inner: &'a mut B,
    checksum: C,
}

impl<'a, B: ReadBytes, C: Checksum> ChecksumReader<'a, B, C> {
    /// Taps `inner` with the given checksum state.
    pub fn new(inner: &'a mut B, checksum: C) -> ChecksumReader<'a, B, C> {
        ChecksumReader { inner, checksum }
    }

    /// The running checksum.
    pub fn checksum(&self) -> &C {
        &self.checksum
    }

    /// The inner stream. Reads through this reference bypass the checksum.
    pub fn inner_mut(&mut self) -> &mut B {
        self.inner
    }

    /// Discards the tap, returning the inner stream.
    pub fn into_inner(self) -> &'a mut B {
        self.inner
    }
}

impl<B: ReadBytes, C: Checksum> ReadBytes for ChecksumReader<'_, B, C> {
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read_buf(buf)?;
        self.checksum.update(&buf[..n]);
        Ok(n)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_buf_exact(buf)?;
        self.checksum.update(buf);
        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        self.inner.ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.inner.pos()
    }
}
