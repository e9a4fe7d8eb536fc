// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use crate::errors::Result;

use super::ReadBytes;

#[inline(always)]
fn out_of_bounds_error<T>() -> Result<T> {
    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "out of bounds").into())
}

/// A `ScopedStream` bounds reads on a borrowed inner stream to a fixed byte budget.
///
/// The metadata reader uses it to guarantee a block parser can never consume past the length
/// declared in the block's header.
pub struct ScopedStream<'a, B: ReadBytes> {
    inner: &'a mut B,
    /// Bytes of the budget not yet consumed.
    rem: u64,
}

impl<'a, B: ReadBytes> ScopedStream<'a, B> {
    /// Scope the next `len` bytes of `inner`.
    pub fn new(inner: &'a mut B, len: u64) -> Self {
        ScopedStream { inner, rem: len }
    }

    /// The number of bytes still readable within the scope.
    pub fn bytes_available(&self) -> u64 {
        self.rem
    }

    /// Skips whatever remains of the scope.
    pub fn ignore(&mut self) -> Result<()> {
        let rem = self.rem;
        self.rem = 0;
        self.inner.ignore_bytes(rem)
    }

    /// Deducts `count` bytes from the budget, failing when the scope is exceeded.
    #[inline(always)]
    fn charge(&mut self, count: u64) -> Result<()> {
        if count > self.rem {
            return out_of_bounds_error();
        }

        self.rem -= count;
        Ok(())
    }
}

impl<B: ReadBytes> ReadBytes for ScopedStream<'_, B> {
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        // A short read is bounded by the budget rather than failing.
        let limit = (buf.len() as u64).min(self.rem) as usize;

        let n = self.inner.read_buf(&mut buf[..limit])?;
        self.rem -= n as u64;

        Ok(n)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.charge(buf.len() as u64)?;
        self.inner.read_buf_exact(buf)
    }

    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        self.charge(count)?;
        self.inner.ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.inner.pos()
    }
}
