// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A pure Rust Free Lossless Audio Codec: encoder, decoder, and metadata editor.

pub mod decoder;
pub mod encoder;
pub mod format;
pub mod meta;

mod fixed;
mod frame;
mod lpc;
mod rice;
mod subframe;
mod validate;

pub use decoder::{
    DecodeIssue, DecoderOptions, DecoderSink, DecoderState, FrameInfo, MetadataFilter,
    SinkAction, StreamDecoder,
};
pub use encoder::{EncoderOptions, StreamEncoder};
pub use lpc::Apodization;
