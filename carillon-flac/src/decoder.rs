// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `decoder` module implements the FLAC stream decoder: a state machine that scans the
//! stream marker and metadata chain, synchronizes to frames, decodes them with CRC and MD5
//! protection, and performs sample-accurate seeks.

use std::io::SeekFrom;

use carillon_core::audio::{AudioBuffer, SignalSpec};
use carillon_core::checksum::{Checksum, Crc16Ansi};
use carillon_core::errors::{
    config_error, decode_error, is_end_of_stream, seek_error, Error, Result, SeekErrorKind,
};
use carillon_core::io::{
    BitReader, ChecksumReader, MediaSource, MediaSourceStream, ReadBytes, ScopedStream,
};

use log::{debug, warn};

use crate::format::channels_from_count;
use crate::frame::{
    read_frame_header, sync_frame, BlockSequence, BlockingStrategy, ChannelAssignment, FrameHeader,
};
use crate::meta::{
    MetadataBlock, MetadataBlockHeader, MetadataBlockType, SeekTable, StreamInfo,
};
use crate::subframe::read_subframe;
use crate::validate::Validator;

fn decorrelate_left_side(left: &[i32], side: &mut [i32]) {
    for (s, l) in side.iter_mut().zip(left) {
        *s = *l - *s;
    }
}

fn decorrelate_mid_side(mid: &mut [i32], side: &mut [i32]) {
    for (m, s) in mid.iter_mut().zip(side) {
        // Mid (M) is given as M = (L + R)/2, while Side (S) is given as S = L - R. Integer
        // division in the encoder discarded the LSB of L + R, but that bit is recoverable: it
        // always equals the LSB of S. Work at double precision so no accuracy is lost:
        //      - L = (2*M + (S%2) + S) / 2
        //      - R = (2*M + (S%2) - S) / 2
        let mid = (*m << 1) | (*s & 1);
        let side = *s;
        *m = (mid + side) >> 1;
        *s = (mid - side) >> 1;
    }
}

fn decorrelate_right_side(right: &[i32], side: &mut [i32]) {
    for (s, r) in side.iter_mut().zip(right) {
        *s += *r;
    }
}

/// The decoding state of a [`StreamDecoder`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// The decoder has not yet read the stream marker.
    SearchForMetadata,
    /// The decoder is reading the metadata chain.
    ReadMetadata,
    /// The decoder is scanning for the next frame synchronization code.
    SearchForFrameSync,
    /// The decoder is parsing a frame.
    ReadFrame,
    /// The end of the stream was reached.
    EndOfStream,
    /// The stream does not appear to be FLAC.
    Unparseable,
    /// A sink aborted decoding.
    Aborted,
}

impl DecoderState {
    /// A static description of the state.
    pub fn description(&self) -> &'static str {
        match *self {
            DecoderState::SearchForMetadata => "searching for metadata",
            DecoderState::ReadMetadata => "reading metadata",
            DecoderState::SearchForFrameSync => "searching for frame sync",
            DecoderState::ReadFrame => "reading frame",
            DecoderState::EndOfStream => "end of stream",
            DecoderState::Unparseable => "stream is unparseable",
            DecoderState::Aborted => "aborted by sink",
        }
    }
}

/// A recoverable decoding problem reported through [`DecoderSink::error`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeIssue {
    /// Synchronization to a frame was lost.
    LostSync,
    /// A frame header failed its CRC or field validation.
    BadHeader,
    /// A whole frame failed its CRC.
    FrameCrcMismatch,
    /// The stream could not be parsed at all.
    UnparseableStream,
}

/// A sink's verdict on continuing after receiving audio.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SinkAction {
    Continue,
    Abort,
}

/// Descriptive parameters of one decoded frame.
#[derive(Copy, Clone, Debug)]
pub struct FrameInfo {
    /// The index of the first delivered sample, per channel, from the start of the stream.
    pub first_sample: u64,
    /// The number of samples per channel delivered.
    pub block_len: u32,
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    pub channels: u32,
}

/// The receiving side of a [`StreamDecoder`]. All callbacks fire in stream order: metadata
/// precedes audio, and frame `k` precedes frame `k + 1`. Errors may interleave between frames.
pub trait DecoderSink {
    /// Receives one metadata block, subject to the decoder's metadata filter.
    fn metadata(&mut self, _block: &MetadataBlock) {}

    /// Receives the planar samples of one decoded frame.
    fn audio(&mut self, _frame: &FrameInfo, _buf: &AudioBuffer) -> SinkAction {
        SinkAction::Continue
    }

    /// Receives a recoverable decoding problem. Decoding continues by resynchronizing.
    fn error(&mut self, _issue: DecodeIssue) {}
}

/// Selects which metadata block types are delivered to the sink.
#[derive(Copy, Clone, Debug)]
pub struct MetadataFilter {
    mask: u8,
    unknown: bool,
}

impl MetadataFilter {
    /// A filter delivering every block type.
    pub fn respond_all() -> MetadataFilter {
        MetadataFilter { mask: 0x7f, unknown: true }
    }

    /// A filter delivering no blocks at all.
    pub fn ignore_all() -> MetadataFilter {
        MetadataFilter { mask: 0, unknown: false }
    }

    /// Enables delivery of the given block type.
    pub fn respond(&mut self, block_type: MetadataBlockType) {
        match block_type {
            MetadataBlockType::Unknown(_) => self.unknown = true,
            _ => self.mask |= 1 << block_type.code(),
        }
    }

    /// Disables delivery of the given block type.
    pub fn ignore(&mut self, block_type: MetadataBlockType) {
        match block_type {
            MetadataBlockType::Unknown(_) => self.unknown = false,
            _ => self.mask &= !(1 << block_type.code()),
        }
    }

    fn is_responding(&self, block_type: MetadataBlockType) -> bool {
        match block_type {
            MetadataBlockType::Unknown(_) => self.unknown,
            _ => self.mask & (1 << block_type.code()) != 0,
        }
    }
}

impl Default for MetadataFilter {
    /// By default only the stream information block is delivered.
    fn default() -> Self {
        MetadataFilter { mask: 1 << MetadataBlockType::StreamInfo.code(), unknown: false }
    }
}

/// `DecoderOptions` configure a [`StreamDecoder`] at creation.
#[derive(Clone, Debug, Default)]
pub struct DecoderOptions {
    /// Check the MD5 signature of the decoded audio against the stream information block when
    /// the stream ends.
    pub verify_md5: bool,
    /// Which metadata blocks are delivered to the sink.
    pub metadata_filter: MetadataFilter,
}

/// Free Lossless Audio Codec (FLAC) stream decoder.
pub struct StreamDecoder {
    reader: MediaSourceStream,
    opts: DecoderOptions,
    state: DecoderState,
    stream_info: Option<StreamInfo>,
    seek_table: Option<SeekTable>,
    first_frame_offset: u64,
    buf: AudioBuffer,
    validator: Validator,
    /// False once a seek has made the running MD5 meaningless.
    md5_valid: bool,
    /// Samples to trim from the front of the next decoded frame after a seek.
    skip_samples: u64,
    /// The sample index one past the last decoded frame.
    next_sample: u64,
}

enum FrameOutcome {
    /// A frame was fully read; the flag is the CRC-16 verdict.
    Frame(FrameHeader, bool),
    /// The candidate frame header did not parse or validate.
    BadHeader,
    /// The frame body could not be read.
    LostSync,
    /// The stream ended inside the frame.
    EndedInFrame,
}

impl StreamDecoder {
    /// Instantiate a decoder over `source`. No bytes are read until the first operation.
    pub fn try_new(source: Box<dyn MediaSource>, opts: DecoderOptions) -> Result<StreamDecoder> {
        Ok(StreamDecoder {
            reader: MediaSourceStream::new(source, Default::default()),
            opts,
            state: DecoderState::SearchForMetadata,
            stream_info: None,
            seek_table: None,
            first_frame_offset: 0,
            buf: AudioBuffer::unused(),
            validator: Default::default(),
            md5_valid: true,
            skip_samples: 0,
            next_sample: 0,
        })
    }

    /// The current state of the decoder.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// The stream information block, available after the metadata has been read.
    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// The seek table of the stream, if one was present.
    pub fn seek_table(&self) -> Option<&SeekTable> {
        self.seek_table.as_ref()
    }

    /// The sample index the next decoded frame will start at.
    pub fn next_sample(&self) -> u64 {
        self.next_sample
    }

    /// Reads the stream marker and the whole metadata chain, delivering filtered blocks to the
    /// sink, and leaves the decoder ready to decode frames.
    pub fn read_metadata(&mut self, sink: &mut dyn DecoderSink) -> Result<()> {
        if self.state != DecoderState::SearchForMetadata {
            return config_error("metadata has already been read");
        }

        let marker = self.reader.read_quad_bytes()?;

        if marker != crate::format::STREAM_MARKER {
            self.state = DecoderState::Unparseable;
            sink.error(DecodeIssue::UnparseableStream);
            return decode_error("flac: missing flac stream marker");
        }

        self.state = DecoderState::ReadMetadata;

        loop {
            let header = MetadataBlockHeader::read(&mut self.reader)?;

            let is_stream_info = header.block_type == MetadataBlockType::StreamInfo;

            if self.stream_info.is_none() && !is_stream_info {
                return decode_error("flac: first block is not stream info");
            }

            if self.stream_info.is_some() && is_stream_info {
                return decode_error("flac: found more than one stream info block");
            }

            let is_last = header.is_last;

            let mut block_stream = ScopedStream::new(&mut self.reader, u64::from(header.block_len));

            let block = MetadataBlock::read(&mut block_stream, &header)?;

            block_stream.ignore()?;

            match &block {
                MetadataBlock::StreamInfo(info) => {
                    self.stream_info = Some(info.clone());
                }
                MetadataBlock::SeekTable(table) => {
                    if self.seek_table.is_some() {
                        return decode_error("flac: found more than one seek table block");
                    }
                    self.seek_table = Some(table.clone());
                }
                _ => (),
            }

            if self.opts.metadata_filter.is_responding(block.block_type()) {
                sink.metadata(&block);
            }

            if is_last {
                break;
            }
        }

        // The mandatory stream information block describes the buffers every frame is decoded
        // into. All allocation happens here, none in the decode loop.
        let info = self.stream_info.as_ref().expect("stream info was checked above");

        let channels = channels_from_count(info.channels)
            .ok_or(Error::DecodeError("flac: stream channels are out of bounds"))?;

        let spec = SignalSpec::new(info.sample_rate, channels);

        self.buf = AudioBuffer::new(usize::from(info.block_len_max), spec);
        self.first_frame_offset = self.reader.pos();
        self.state = DecoderState::SearchForFrameSync;

        Ok(())
    }

    /// Decodes the next frame and delivers its samples to the sink. Returns false when the end
    /// of the stream is reached. Malformed frames are reported through the sink's error hook
    /// and skipped by resynchronizing.
    pub fn decode_frame(&mut self, sink: &mut dyn DecoderSink) -> Result<bool> {
        match self.state {
            DecoderState::SearchForMetadata => self.read_metadata(sink)?,
            DecoderState::EndOfStream => return Ok(false),
            DecoderState::Aborted => return config_error("decoder was aborted by its sink"),
            DecoderState::Unparseable => return decode_error("flac: stream is unparseable"),
            _ => (),
        }

        let info = self.stream_info.clone().expect("metadata has been read");

        loop {
            self.state = DecoderState::SearchForFrameSync;

            let sync = match sync_frame(&mut self.reader) {
                Ok(sync) => sync,
                Err(err) if is_end_of_stream(&err) => {
                    // End-of-stream at a frame boundary is the normal termination.
                    self.state = DecoderState::EndOfStream;
                    return Ok(false);
                }
                Err(err) => return Err(err),
            };

            let frame_pos = self.reader.pos() - 2;

            self.state = DecoderState::ReadFrame;

            match self.try_read_frame(sync, &info)? {
                FrameOutcome::Frame(header, true) => {
                    let nominal = info.block_len_max;
                    let block_len = u32::from(header.block_num_samples);
                    let bps = header.bits_per_sample.unwrap_or(info.bits_per_sample);

                    let ts = header.first_sample(nominal);

                    if self.opts.verify_md5 && self.md5_valid {
                        let n_channels = self.buf.spec().channels.count();
                        let channels: Vec<&[i32]> =
                            (0..n_channels).map(|ch| self.buf.chan(ch)).collect();
                        self.validator.update(&channels, bps);
                    }

                    self.next_sample = ts + u64::from(block_len);

                    // After a seek, trim the delivered samples to begin exactly at the target.
                    let mut first_sample = ts;

                    if self.skip_samples > 0 {
                        if self.skip_samples >= u64::from(block_len) {
                            self.skip_samples -= u64::from(block_len);
                            continue;
                        }

                        self.buf.trim_start(self.skip_samples as usize);
                        first_sample = ts + self.skip_samples;
                        self.skip_samples = 0;
                    }

                    let frame_info = FrameInfo {
                        first_sample,
                        block_len: self.buf.frames() as u32,
                        sample_rate: header.sample_rate.unwrap_or(info.sample_rate),
                        bits_per_sample: bps,
                        channels: header.channel_assignment.count(),
                    };

                    if sink.audio(&frame_info, &self.buf) == SinkAction::Abort {
                        self.state = DecoderState::Aborted;
                        return Ok(false);
                    }

                    self.state = DecoderState::SearchForFrameSync;
                    return Ok(true);
                }
                FrameOutcome::Frame(_, false) => {
                    warn!("frame crc mismatch, skipping frame");
                    sink.error(DecodeIssue::FrameCrcMismatch);
                }
                FrameOutcome::BadHeader => {
                    sink.error(DecodeIssue::BadHeader);

                    // Resume the scan one byte past the rejected sync candidate.
                    self.reader.seek_buffered(frame_pos + 1);
                }
                FrameOutcome::LostSync => {
                    sink.error(DecodeIssue::LostSync);
                }
                FrameOutcome::EndedInFrame => {
                    sink.error(DecodeIssue::LostSync);
                    self.state = DecoderState::EndOfStream;
                    return Ok(false);
                }
            }
        }
    }

    /// Decodes frames until the end of the stream.
    pub fn decode_all(&mut self, sink: &mut dyn DecoderSink) -> Result<()> {
        while self.decode_frame(sink)? {}
        Ok(())
    }

    /// Verifies the MD5 signature of all decoded audio against the stream information block.
    /// Only meaningful when MD5 checking was requested, the stream carried a signature, and no
    /// seek interrupted decoding.
    pub fn finish(&mut self) -> Result<()> {
        if !self.opts.verify_md5 || !self.md5_valid {
            return Ok(());
        }

        let expected = match self.stream_info.as_ref().and_then(|info| info.md5) {
            Some(expected) => expected,
            None => {
                warn!("md5 checking requested but the stream carries no signature");
                return Ok(());
            }
        };

        let decoded = self.validator.md5();

        if log::log_enabled!(log::Level::Debug) {
            use std::fmt::Write;

            let mut expected_s = String::with_capacity(32);
            let mut decoded_s = String::with_capacity(32);

            expected.iter().for_each(|b| write!(expected_s, "{:02x}", b).unwrap());
            decoded.iter().for_each(|b| write!(decoded_s, "{:02x}", b).unwrap());

            debug!("verification: expected md5 = {}", expected_s);
            debug!("verification: decoded md5  = {}", decoded_s);
        }

        if decoded != expected {
            return Err(Error::Md5Mismatch);
        }

        Ok(())
    }

    /// Positions the decoder so the next decoded frame delivers samples starting exactly at
    /// `target`. Uses the stream's seek table when present, then a binary search over frame
    /// headers, then a linear refinement.
    pub fn seek_to_sample(&mut self, target: u64) -> Result<()> {
        let info = match &self.stream_info {
            Some(info) => info.clone(),
            None => return config_error("metadata must be read before seeking"),
        };

        if !self.reader.is_seekable() {
            return seek_error(SeekErrorKind::Unseekable);
        }

        if let Some(total) = info.n_samples {
            if target >= total {
                return seek_error(SeekErrorKind::OutOfRange);
            }
        }

        let mut lo = self.first_frame_offset;
        let mut hi = match self.reader.byte_len() {
            Some(len) => len,
            None => self.reader.seek(SeekFrom::End(0))?,
        };

        // A seek table narrows the search range; its points are frame boundaries.
        if let Some(table) = &self.seek_table {
            for point in table.points.iter().filter(|p| !p.is_placeholder()) {
                if point.sample_number <= target {
                    lo = lo.max(self.first_frame_offset + point.stream_offset);
                }
                else {
                    hi = hi.min(self.first_frame_offset + point.stream_offset);
                    break;
                }
            }
        }

        // Binary search by probing frame headers. The search becomes inefficient once the
        // range shrinks to a few frames; finish linearly from there.
        let max_frame_len =
            if info.frame_byte_len_max > 0 { u64::from(info.frame_byte_len_max) } else { 8096 };

        while hi > lo && hi - lo > 2 * max_frame_len {
            let mid = lo + (hi - lo) / 2;

            self.reader.seek(SeekFrom::Start(mid))?;

            match self.probe_next_frame(&info)? {
                Some((ts, len, pos)) => {
                    if target < ts {
                        hi = mid;
                    }
                    else if target < ts + u64::from(len) {
                        return self.finish_seek(pos, ts, target);
                    }
                    else {
                        lo = pos + 1;
                    }
                }
                None => hi = mid,
            }
        }

        // Linear refinement: walk frames forward until the one containing the target.
        self.reader.seek(SeekFrom::Start(lo))?;

        loop {
            match self.probe_next_frame(&info)? {
                Some((ts, len, pos)) => {
                    if target < ts {
                        // Overshot; land at the start of this frame without trimming.
                        debug!("seek overshot target, landing at sample {}", ts);
                        return self.finish_seek(pos, ts, ts);
                    }
                    else if target < ts + u64::from(len) {
                        return self.finish_seek(pos, ts, target);
                    }

                    // This frame precedes the target; keep scanning behind its header.
                }
                // The stream ended before the target sample: truncated stream.
                None => return seek_error(SeekErrorKind::OutOfRange),
            }
        }
    }

    /// Scans forward for the next parseable, stream-consistent frame header. Returns the
    /// header's sample index, block length, and the byte position of its sync code, or `None`
    /// at end-of-stream.
    fn probe_next_frame(&mut self, info: &StreamInfo) -> Result<Option<(u64, u32, u64)>> {
        loop {
            let sync = match sync_frame(&mut self.reader) {
                Ok(sync) => sync,
                Err(err) if is_end_of_stream(&err) => return Ok(None),
                Err(err) => return Err(err),
            };

            let pos = self.reader.pos() - 2;

            match read_frame_header(&mut self.reader, sync) {
                Ok(header) if header_matches_stream(info, &header) => {
                    let ts = header.first_sample(info.block_len_max);
                    return Ok(Some((ts, u32::from(header.block_num_samples), pos)));
                }
                Ok(_) => {
                    self.reader.seek_buffered(pos + 1);
                }
                Err(err) if is_end_of_stream(&err) => return Ok(None),
                Err(Error::DecodeError(_)) => {
                    self.reader.seek_buffered(pos + 1);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn finish_seek(&mut self, pos: u64, ts: u64, target: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(pos))?;

        self.skip_samples = target - ts;
        self.next_sample = ts;

        // The running MD5 no longer covers the whole stream.
        self.md5_valid = false;

        self.state = DecoderState::SearchForFrameSync;

        Ok(())
    }

    /// Reads the header and body of the frame whose sync code was just consumed.
    fn try_read_frame(&mut self, sync: u16, info: &StreamInfo) -> Result<FrameOutcome> {
        // The frame footer CRC-16 covers every byte of the frame, sync code included.
        let mut crc16 = Crc16Ansi::new(0);
        crc16.update(&sync.to_be_bytes());

        let mut reader = ChecksumReader::new(&mut self.reader, crc16);

        let header = match read_frame_header(&mut reader, sync) {
            Ok(header) => header,
            Err(err) if is_end_of_stream(&err) => return Ok(FrameOutcome::EndedInFrame),
            Err(Error::DecodeError(_)) => return Ok(FrameOutcome::BadHeader),
            Err(err) => return Err(err),
        };

        if !header_matches_stream(info, &header) {
            return Ok(FrameOutcome::BadHeader);
        }

        let bps = header.bits_per_sample.unwrap_or(info.bits_per_sample);

        match read_frame_body(&mut reader, &header, bps, &mut self.buf) {
            Ok(crc_ok) => Ok(FrameOutcome::Frame(header, crc_ok)),
            Err(err) if is_end_of_stream(&err) => Ok(FrameOutcome::EndedInFrame),
            Err(Error::DecodeError(_)) | Err(Error::Unsupported(_)) => Ok(FrameOutcome::LostSync),
            Err(err) => Err(err),
        }
    }
}

/// Validates a frame header against the parameters of the stream information block.
fn header_matches_stream(info: &StreamInfo, header: &FrameHeader) -> bool {
    if header.channel_assignment.count() != info.channels {
        return false;
    }

    if u32::from(header.block_num_samples) > u32::from(info.block_len_max) {
        return false;
    }

    if let Some(rate) = header.sample_rate {
        if rate != info.sample_rate {
            return false;
        }
    }

    if let Some(bps) = header.bits_per_sample {
        if bps != info.bits_per_sample {
            return false;
        }
    }

    // A fixed-blocksize stream must use the fixed blocking strategy; a variable strategy with
    // equal blocksize bounds is malformed.
    if info.block_len_min == info.block_len_max {
        if header.blocking_strategy != BlockingStrategy::Fixed {
            return false;
        }

        if !matches!(header.block_sequence, BlockSequence::ByFrame(_)) {
            return false;
        }
    }

    true
}

/// Reads the subframes, padding, and footer CRC of a frame whose header was read through the
/// given CRC-16 tap, and inverse-decorrelates the channels. Returns the CRC-16 verdict;
/// channels are only decorrelated for frames that pass.
pub(crate) fn read_frame_body<B: ReadBytes>(
    reader: &mut ChecksumReader<'_, B, Crc16Ansi>,
    header: &FrameHeader,
    bps: u32,
    buf: &mut AudioBuffer,
) -> Result<bool> {
    let block_len = usize::from(header.block_num_samples);

    buf.clear();
    buf.render_reserved(block_len);

    {
        let mut bs = BitReader::new(&mut *reader);

        match header.channel_assignment {
            ChannelAssignment::Independent(channels) => {
                for i in 0..channels as usize {
                    read_subframe(&mut bs, bps, buf.chan_mut(i))?;
                }
            }
            // For Left/Side, Mid/Side, and Right/Side channel configurations, the Side
            // (difference) channel requires an extra bit per sample.
            ChannelAssignment::LeftSide => {
                let (left, side) = buf.chan_pair_mut(0, 1);

                read_subframe(&mut bs, bps, left)?;
                read_subframe(&mut bs, bps + 1, side)?;
            }
            ChannelAssignment::MidSide => {
                let (mid, side) = buf.chan_pair_mut(0, 1);

                read_subframe(&mut bs, bps, mid)?;
                read_subframe(&mut bs, bps + 1, side)?;
            }
            ChannelAssignment::RightSide => {
                let (side, right) = buf.chan_pair_mut(0, 1);

                read_subframe(&mut bs, bps + 1, side)?;
                read_subframe(&mut bs, bps, right)?;
            }
        }

        // Discard the zero bits padding the frame to a byte boundary. The padded byte, if any,
        // was already consumed from the stream and counted by the CRC.
        bs.realign();
    }

    let crc16_computed = reader.checksum().crc();

    // The footer itself is not covered by the CRC; read it from the inner stream.
    let crc16_expected = reader.inner_mut().read_be_u16()?;

    if crc16_computed != crc16_expected {
        return Ok(false);
    }

    match header.channel_assignment {
        ChannelAssignment::Independent(_) => (),
        ChannelAssignment::LeftSide => {
            let (left, side) = buf.chan_pair_mut(0, 1);
            decorrelate_left_side(left, side);
        }
        ChannelAssignment::MidSide => {
            let (mid, side) = buf.chan_pair_mut(0, 1);
            decorrelate_mid_side(mid, side);
        }
        ChannelAssignment::RightSide => {
            let (side, right) = buf.chan_pair_mut(0, 1);
            decorrelate_right_side(right, side);
        }
    }

    Ok(true)
}
