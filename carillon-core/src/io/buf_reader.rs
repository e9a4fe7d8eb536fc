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
fn underrun_error<T>() -> Result<T> {
    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "buffer underrun").into())
}

/// A `BufReader` reads bytes from a byte slice.
pub struct BufReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BufReader<'a> {
    /// Instantiate a new `BufReader` over the given slice.
    pub fn new(buf: &'a [u8]) -> Self {
        BufReader { buf, pos: 0 }
    }
}

impl ReadBytes for BufReader<'_> {
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.buf.len() - self.pos);

        if n == 0 && !buf.is_empty() {
            return underrun_error();
        }

        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;

        Ok(n)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len();

        if end > self.buf.len() {
            return underrun_error();
        }

        buf.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;

        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        let end = self.pos as u64 + count;

        if end > self.buf.len() as u64 {
            return underrun_error();
        }

        self.pos = end as usize;
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.pos as u64
    }

    #[inline(always)]
    fn read_u8(&mut self) -> Result<u8> {
        match self.buf.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => underrun_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BufReader;
    use crate::io::ReadBytes;

    #[test]
    fn verify_buf_reader() {
        let mut reader = BufReader::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);

        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_be_u16().unwrap(), 0x0203);
        assert_eq!(reader.read_be_u24().unwrap(), 0x04_0506);
        assert_eq!(reader.pos(), 6);

        reader.ignore_bytes(1).unwrap();

        let mut buf = [0u8; 2];
        reader.read_buf_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x08, 0x09]);

        // Everything is consumed.
        assert!(reader.read_u8().is_err());
        assert!(reader.ignore_bytes(1).is_err());

        // A partial read returns what remains.
        let mut reader = BufReader::new(&[0xaa, 0xbb]);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_buf(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0xaa, 0xbb]);
    }
}
