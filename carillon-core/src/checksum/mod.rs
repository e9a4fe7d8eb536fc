// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `checksum` module provides the error-detecting codes and hashing algorithms used by
//! the FLAC bitstream.

mod crc16;
mod crc8;
mod md5;

pub use crc16::Crc16Ansi;
pub use crc8::Crc8Ccitt;
pub use md5::Md5;

/// A `Checksum` accumulates a running error-detection or signature value over a stream of
/// bytes.
///
/// Implementations are fed through [`update`](Checksum::update) in arbitrarily sized pieces;
/// feeding a buffer whole or byte-by-byte must yield the same value.
pub trait Checksum {
    /// Folds `buf` into the running value.
    fn update(&mut self, buf: &[u8]);
}
