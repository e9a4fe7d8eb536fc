// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `SeekErrorKind` is a list of generic reasons why a seek may fail.
#[derive(Debug)]
pub enum SeekErrorKind {
    /// The stream is not seekable at all.
    Unseekable,
    /// The stream can only be seeked forward.
    ForwardOnly,
    /// The sample to seek to is out of range.
    OutOfRange,
}

impl SeekErrorKind {
    fn as_str(&self) -> &'static str {
        match *self {
            SeekErrorKind::Unseekable => "stream is not seekable",
            SeekErrorKind::ForwardOnly => "stream can only be seeked forward",
            SeekErrorKind::OutOfRange => "requested seek sample is out-of-range for stream",
        }
    }
}

/// The exact point at which an encoder's verification decoder disagreed with the original
/// signal.
#[derive(Debug)]
pub struct VerifyFailure {
    /// The absolute index of the offending sample, counted per channel from the start of the
    /// stream.
    pub sample: u64,
    /// The channel the offending sample belongs to.
    pub channel: u32,
    /// The sample value fed to the encoder.
    pub expected: i32,
    /// The sample value reconstructed by the verification decoder.
    pub got: i32,
}

/// `Error` provides an enumeration of all possible errors reported by Carillon.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred while reading, writing, or seeking the stream.
    IoError(io::Error),
    /// The stream contained malformed data and could not be decoded.
    DecodeError(&'static str),
    /// The stream could not be seeked.
    SeekError(SeekErrorKind),
    /// An unsupported feature was encountered.
    Unsupported(&'static str),
    /// A default or user-defined limit was reached while decoding the stream. Limits are used to
    /// prevent denial-of-service attacks from malicious streams.
    LimitError(&'static str),
    /// An encoder or decoder was configured with an illegal option or option combination.
    ConfigError(&'static str),
    /// An encoder option violates the streamable subset while subset conformance is enabled.
    NotStreamable(&'static str),
    /// A metadata chain or iterator operation failed.
    MetadataError(&'static str),
    /// A metadata file could not be opened for writing.
    NotWritable,
    /// The MD5 signature of the decoded audio does not match the signature recorded in the
    /// stream information block.
    Md5Mismatch,
    /// The encoder's verification decoder reconstructed a sample that differs from the original
    /// signal.
    VerifyMismatch(VerifyFailure),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::SeekError(ref kind) => {
                write!(f, "seek error: {}", kind.as_str())
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
            Error::ConfigError(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
            Error::NotStreamable(msg) => {
                write!(f, "streamable subset violation: {}", msg)
            }
            Error::MetadataError(msg) => {
                write!(f, "metadata error: {}", msg)
            }
            Error::NotWritable => {
                write!(f, "file is not writable")
            }
            Error::Md5Mismatch => {
                write!(f, "md5 signature of decoded audio does not match stream information")
            }
            Error::VerifyMismatch(ref failure) => {
                write!(
                    f,
                    "verification failed at sample {} of channel {}: expected {}, got {}",
                    failure.sample, failure.channel, failure.expected, failure.got
                )
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Returns true if the error is the result of an unexpected end-of-stream.
pub fn is_end_of_stream(err: &Error) -> bool {
    match err {
        Error::IoError(err) => err.kind() == io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create a seek error.
pub fn seek_error<T>(kind: SeekErrorKind) -> Result<T> {
    Err(Error::SeekError(kind))
}

/// Convenience function to create an unsupported feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create a limit error.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}

/// Convenience function to create a configuration error.
pub fn config_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::ConfigError(desc))
}

/// Convenience function to create a streamable subset violation error.
pub fn not_streamable_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::NotStreamable(desc))
}

/// Convenience function to create a metadata error.
pub fn metadata_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::MetadataError(desc))
}

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream")))
}
