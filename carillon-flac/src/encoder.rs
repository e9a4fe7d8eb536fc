// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `encoder` module implements the FLAC stream encoder: block staging, stereo
//! decorrelation, subframe selection, frame assembly with CRC protection, metadata emission
//! with stream-info and seek-table back-patching, and lock-step output verification.

use std::io::SeekFrom;

use carillon_core::audio::AudioBuffer;
use carillon_core::checksum::{Checksum, Crc16Ansi};
use carillon_core::errors::{
    config_error, decode_error, not_streamable_error, Error, Result, VerifyFailure,
};
use carillon_core::io::{BitWriter, BufReader, ChecksumReader, MediaSink};

use log::debug;

use crate::decoder::read_frame_body;
use crate::format;
use crate::frame::{read_frame_header, sync_frame, write_frame_header, ChannelAssignment};
use crate::lpc::Apodization;
use crate::meta::{MetadataBlock, MetadataBlockType, SeekPoint, SeekTable, StreamInfo};
use crate::subframe::{plan_subframe, write_subframe, SubframeOptions, SubframePlan};

/// `EncoderOptions` describe the signal and steer the compression of a [`StreamEncoder`].
///
/// Once an encoder is constructed from a set of options they are frozen; there is no way to
/// reconfigure a live encoder.
#[derive(Clone, Debug)]
pub struct EncoderOptions {
    /// The number of channels, between 1 and 8.
    pub channels: u32,
    /// The sample width, between 4 and 32 bits.
    pub bits_per_sample: u32,
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// An estimate of the total samples per channel that will be encoded, written into the
    /// stream information block up front. 0 if unknown. The true count replaces it at finish
    /// when the sink is seekable.
    pub total_samples_estimate: u64,
    /// The block length in samples. 0 selects a default.
    pub block_len: u32,
    /// Decode every emitted frame in lock-step and compare against the original signal.
    pub verify: bool,
    /// Restrict parameters to the streamable subset.
    pub streamable_subset: bool,
    /// Consider the joint stereo channel modes. Stereo streams only.
    pub mid_side: bool,
    /// Choose the channel mode with a fast estimator rather than full evaluation.
    pub loose_mid_side: bool,
    /// The maximum linear predictor order. 0 disables the linear predictor.
    pub max_lpc_order: u32,
    /// Quantized linear predictor coefficient precision in bits. 0 selects a precision from
    /// the block length.
    pub qlp_coeff_precision: u32,
    /// Search every coefficient precision instead of one.
    pub do_qlp_coeff_prec_search: bool,
    /// Consider every linear predictor order instead of the estimated best.
    pub do_exhaustive_model_search: bool,
    /// Allow escaped (binary coded) residual partitions.
    pub do_escape_coding: bool,
    pub min_residual_partition_order: u32,
    pub max_residual_partition_order: u32,
    /// Apodization windows tried in order for each block; the cheapest wins.
    pub apodization: Vec<Apodization>,
    /// Metadata blocks to emit between the stream information block and the first frame.
    pub metadata: Vec<MetadataBlock>,
}

impl EncoderOptions {
    /// Options for a signal, at the default compression level.
    pub fn new(channels: u32, bits_per_sample: u32, sample_rate: u32) -> EncoderOptions {
        EncoderOptions {
            channels,
            bits_per_sample,
            sample_rate,
            total_samples_estimate: 0,
            block_len: 0,
            verify: false,
            streamable_subset: true,
            mid_side: true,
            loose_mid_side: false,
            max_lpc_order: 8,
            qlp_coeff_precision: 0,
            do_qlp_coeff_prec_search: false,
            do_exhaustive_model_search: false,
            do_escape_coding: false,
            min_residual_partition_order: 0,
            max_residual_partition_order: 5,
            apodization: vec![Apodization::Tukey(0.5)],
            metadata: Vec::new(),
        }
    }

    /// Applies one of the standard compression level presets, 0 (fastest) through 8 (best).
    pub fn with_compression_level(mut self, level: u32) -> EncoderOptions {
        let level = level.min(8);

        let (block_len, mid_side, loose, lpc, max_po, exhaustive) = match level {
            0 => (1152, false, false, 0, 3, false),
            1 => (1152, true, true, 0, 3, false),
            2 => (1152, true, false, 0, 3, false),
            3 => (4096, false, false, 6, 4, false),
            4 => (4096, true, true, 8, 4, false),
            5 => (4096, true, false, 8, 5, false),
            6 => (4096, true, false, 8, 6, false),
            7 => (4096, true, false, 12, 6, false),
            _ => (4096, true, false, 12, 6, true),
        };

        self.block_len = block_len;
        self.mid_side = mid_side;
        self.loose_mid_side = loose;
        self.max_lpc_order = lpc;
        self.min_residual_partition_order = 0;
        self.max_residual_partition_order = max_po;
        self.do_exhaustive_model_search = exhaustive;

        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EncoderState {
    Active,
    Finished,
    Failed,
}

/// Free Lossless Audio Codec (FLAC) stream encoder.
///
/// Samples are staged with [`StreamEncoder::process`] or
/// [`StreamEncoder::process_interleaved`] and emitted as whole frames.
/// [`StreamEncoder::finish`] flushes the final partial frame and, when the sink is seekable,
/// rewrites the stream information block and resolves seek table offsets.
pub struct StreamEncoder<S: MediaSink> {
    sink: S,
    sink_seekable: bool,
    opts: EncoderOptions,
    sub_opts: SubframeOptions,
    state: EncoderState,

    stream_info: StreamInfo,
    /// Whether the stream information block is the only metadata block.
    stream_info_is_last: bool,

    /// The seek table template, its block header offset, its last flag, and per-point
    /// resolution marks.
    seek_table: Option<(u64, bool, SeekTable, Vec<bool>)>,

    /// Staged, not yet encoded, samples of each channel.
    staged: Vec<Vec<i32>>,

    frame_number: u64,
    next_sample: u64,
    frame_byte_len_min: u32,
    frame_byte_len_max: u32,

    /// Total bytes written to the sink.
    pos: u64,
    first_frame_offset: u64,

    md5: crate::validate::Validator,
    verify_buf: AudioBuffer,
}

impl<S: MediaSink> StreamEncoder<S> {
    /// Validates `opts`, writes the stream marker, the stream information block, and the
    /// caller's metadata blocks to `sink`, and returns an encoder ready for samples.
    ///
    /// Construction is the one-way initialization of the encoder: options cannot change
    /// afterwards. Subset violations fail with [`Error::NotStreamable`], other illegal options
    /// with [`Error::ConfigError`].
    pub fn try_new(sink: S, opts: EncoderOptions) -> Result<StreamEncoder<S>> {
        let mut opts = opts;

        if opts.channels < 1 || opts.channels > format::MAX_CHANNELS {
            return config_error("channels must be between 1 and 8");
        }

        if opts.bits_per_sample < format::MIN_BITS_PER_SAMPLE
            || opts.bits_per_sample > format::MAX_BITS_PER_SAMPLE
        {
            return config_error("bits per sample must be between 4 and 32");
        }

        if opts.sample_rate < 1 || opts.sample_rate > format::MAX_SAMPLE_RATE {
            return config_error("sample rate must be between 1 and 655350 Hz");
        }

        if opts.block_len == 0 {
            opts.block_len = 4096;
        }

        if opts.block_len < u32::from(format::MIN_BLOCK_LEN)
            || opts.block_len > u32::from(format::MAX_BLOCK_LEN)
        {
            return config_error("block length must be between 16 and 65535 samples");
        }

        if opts.max_lpc_order > format::MAX_LPC_ORDER {
            return config_error("lpc order must be no greater than 32");
        }

        if opts.qlp_coeff_precision != 0
            && (opts.qlp_coeff_precision < format::MIN_QLP_COEFF_PRECISION
                || opts.qlp_coeff_precision > format::MAX_QLP_COEFF_PRECISION)
        {
            return config_error("qlp coefficient precision must be between 5 and 15");
        }

        if opts.max_residual_partition_order > format::MAX_RICE_PARTITION_ORDER {
            return config_error("rice partition order must be no greater than 15");
        }

        if opts.min_residual_partition_order > opts.max_residual_partition_order {
            return config_error("minimum rice partition order exceeds the maximum");
        }

        // The joint stereo modes only exist for stereo, and the side channel requires one bit
        // beyond the sample width.
        if opts.channels != 2 || opts.bits_per_sample > 31 {
            opts.mid_side = false;
            opts.loose_mid_side = false;
        }

        if opts.apodization.is_empty() {
            opts.apodization.push(Apodization::Tukey(0.5));
        }

        if opts.streamable_subset {
            if opts.block_len > u32::from(format::SUBSET_MAX_BLOCK_LEN) {
                return not_streamable_error("block length exceeds 16384 samples");
            }

            if opts.sample_rate <= 48_000 {
                if opts.block_len > u32::from(format::SUBSET_MAX_BLOCK_LEN_48K) {
                    return not_streamable_error("block length exceeds 4608 samples at 48kHz or less");
                }

                if opts.max_lpc_order > format::SUBSET_MAX_LPC_ORDER_48K {
                    return not_streamable_error("lpc order exceeds 12 at 48kHz or less");
                }
            }

            if !format::is_subset_sample_rate(opts.sample_rate) {
                return not_streamable_error("sample rate is not expressible in a frame header");
            }

            if !format::is_subset_bits_per_sample(opts.bits_per_sample) {
                return not_streamable_error("bits per sample is not expressible in a frame header");
            }

            if opts.max_residual_partition_order > format::SUBSET_MAX_RICE_PARTITION_ORDER {
                return not_streamable_error("rice partition order exceeds 8");
            }
        }

        // Validate the caller's metadata blocks.
        let mut n_seek_tables = 0;
        let mut n_vorbis_comments = 0;

        for block in &opts.metadata {
            match block.block_type() {
                MetadataBlockType::StreamInfo => {
                    return config_error("metadata must not contain a stream info block");
                }
                MetadataBlockType::SeekTable => n_seek_tables += 1,
                MetadataBlockType::VorbisComment => n_vorbis_comments += 1,
                _ => (),
            }
        }

        if n_seek_tables > 1 {
            return config_error("metadata contains more than one seek table");
        }

        if n_vorbis_comments > 1 {
            return config_error("metadata contains more than one vorbis comment block");
        }

        if let Some(MetadataBlock::SeekTable(table)) =
            opts.metadata.iter().find(|b| b.block_type() == MetadataBlockType::SeekTable)
        {
            if !table.is_legal() {
                return config_error("seek table template is not legal");
            }
        }

        let stream_info = StreamInfo {
            block_len_min: opts.block_len as u16,
            block_len_max: opts.block_len as u16,
            frame_byte_len_min: 0,
            frame_byte_len_max: 0,
            sample_rate: opts.sample_rate,
            channels: opts.channels,
            bits_per_sample: opts.bits_per_sample,
            n_samples: match opts.total_samples_estimate {
                0 => None,
                estimate => Some(estimate),
            },
            md5: None,
        };

        let sub_opts = SubframeOptions {
            max_lpc_order: opts.max_lpc_order,
            qlp_precision: opts.qlp_coeff_precision,
            search_precision: opts.do_qlp_coeff_prec_search,
            exhaustive: opts.do_exhaustive_model_search,
            escape_coding: opts.do_escape_coding,
            min_partition_order: opts.min_residual_partition_order,
            max_partition_order: opts.max_residual_partition_order,
            apodization: opts.apodization.clone(),
        };

        let sink_seekable = sink.is_seekable();

        let channels = channels_spec(opts.channels, opts.sample_rate);
        let verify_buf = AudioBuffer::new(opts.block_len as usize, channels);

        let mut encoder = StreamEncoder {
            sink,
            sink_seekable,
            stream_info_is_last: opts.metadata.is_empty(),
            seek_table: None,
            staged: vec![Vec::new(); opts.channels as usize],
            frame_number: 0,
            next_sample: 0,
            frame_byte_len_min: u32::MAX,
            frame_byte_len_max: 0,
            pos: 0,
            first_frame_offset: 0,
            md5: Default::default(),
            verify_buf,
            stream_info,
            sub_opts,
            state: EncoderState::Active,
            opts,
        };

        encoder.write_stream_header()?;

        Ok(encoder)
    }

    fn write_stream_header(&mut self) -> Result<()> {
        self.sink.write_all(&format::STREAM_MARKER)?;
        self.pos = 4;

        let block = MetadataBlock::StreamInfo(self.stream_info.clone());
        block.write_to(&mut self.sink, self.stream_info_is_last)?;
        self.pos += block.total_len();

        let metadata = std::mem::take(&mut self.opts.metadata);

        let last = metadata.len().saturating_sub(1);

        for (i, block) in metadata.iter().enumerate() {
            if let MetadataBlock::SeekTable(table) = block {
                let resolved = vec![false; table.points.len()];
                self.seek_table = Some((self.pos, i == last, table.clone(), resolved));
            }

            block.write_to(&mut self.sink, i == last)?;
            self.pos += block.total_len();
        }

        self.opts.metadata = metadata;

        self.first_frame_offset = self.pos;

        Ok(())
    }

    /// The options the encoder was constructed with.
    pub fn options(&self) -> &EncoderOptions {
        &self.opts
    }

    /// The stream information block as currently known. Final after [`StreamEncoder::finish`].
    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    /// The number of samples per channel staged or encoded so far.
    pub fn samples_written(&self) -> u64 {
        self.next_sample + self.staged[0].len() as u64
    }

    /// Consumes the encoder and returns the sink.
    pub fn into_inner(self) -> S {
        self.sink
    }

    fn check_active(&self) -> Result<()> {
        match self.state {
            EncoderState::Active => Ok(()),
            EncoderState::Finished => config_error("encoder is finished"),
            EncoderState::Failed => config_error("encoder is in an error state"),
        }
    }

    /// Stages planar samples, one slice per channel, encoding whole blocks as they fill.
    pub fn process(&mut self, samples: &[&[i32]]) -> Result<()> {
        self.check_active()?;

        if samples.len() != self.opts.channels as usize {
            return config_error("sample slice count does not match channel count");
        }

        let len = samples[0].len();

        if samples.iter().any(|channel| channel.len() != len) {
            return config_error("channels must be of equal length");
        }

        for (staged, channel) in self.staged.iter_mut().zip(samples) {
            staged.extend_from_slice(channel);
        }

        self.drain_blocks().map_err(|err| self.fail(err))
    }

    /// Stages interleaved samples, encoding whole blocks as they fill.
    pub fn process_interleaved(&mut self, samples: &[i32]) -> Result<()> {
        self.check_active()?;

        let n_channels = self.opts.channels as usize;

        if samples.len() % n_channels != 0 {
            return config_error("interleaved samples must be a whole number of frames");
        }

        for frame in samples.chunks_exact(n_channels) {
            for (staged, &sample) in self.staged.iter_mut().zip(frame) {
                staged.push(sample);
            }
        }

        self.drain_blocks().map_err(|err| self.fail(err))
    }

    /// Flushes any final partial frame, completes the stream information block, and resolves
    /// the seek table. When the sink is seekable the completed blocks are patched into the
    /// stream; the returned stream information carries the digest either way.
    pub fn finish(&mut self) -> Result<StreamInfo> {
        self.check_active()?;

        let result = self.finish_inner();

        match result {
            Ok(info) => {
                self.state = EncoderState::Finished;
                Ok(info)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = EncoderState::Failed;
        err
    }

    fn finish_inner(&mut self) -> Result<StreamInfo> {
        // The final block may be shorter than the nominal block length.
        if !self.staged[0].is_empty() {
            let channels: Vec<Vec<i32>> =
                self.staged.iter_mut().map(std::mem::take).collect();
            let refs: Vec<&[i32]> = channels.iter().map(|c| c.as_slice()).collect();

            self.write_frame(&refs)?;
        }

        self.stream_info.n_samples = match self.next_sample {
            0 => None,
            n => Some(n),
        };
        self.stream_info.md5 = Some(self.md5.md5());
        self.stream_info.frame_byte_len_min =
            if self.frame_byte_len_min == u32::MAX { 0 } else { self.frame_byte_len_min };
        self.stream_info.frame_byte_len_max = self.frame_byte_len_max;

        if let Some((_, _, table, resolved)) = &mut self.seek_table {
            // Points the audio never reached become placeholders, then placeholders sort last.
            for (point, resolved) in table.points.iter_mut().zip(resolved.iter()) {
                if !resolved {
                    *point = SeekPoint::PLACEHOLDER;
                }
            }

            table.points.sort_by_key(|p| p.sample_number);
        }

        if self.sink_seekable {
            self.sink.seek(SeekFrom::Start(4))?;

            let block = MetadataBlock::StreamInfo(self.stream_info.clone());
            block.write_to(&mut self.sink, self.stream_info_is_last)?;

            if let Some((offset, is_last, table, _)) = &self.seek_table {
                self.sink.seek(SeekFrom::Start(*offset))?;
                MetadataBlock::SeekTable(table.clone()).write_to(&mut self.sink, *is_last)?;
            }

            self.sink.seek(SeekFrom::Start(self.pos))?;
        }
        else {
            debug!("sink is unseekable, stream info cannot be rewritten in place");
        }

        self.sink.flush()?;

        Ok(self.stream_info.clone())
    }

    fn drain_blocks(&mut self) -> Result<()> {
        let block_len = self.opts.block_len as usize;

        while self.staged[0].len() >= block_len {
            let channels: Vec<Vec<i32>> =
                self.staged.iter_mut().map(|staged| staged.drain(..block_len).collect()).collect();
            let refs: Vec<&[i32]> = channels.iter().map(|c| c.as_slice()).collect();

            self.write_frame(&refs)?;
        }

        Ok(())
    }

    /// Encodes and emits one frame from one block of planar channel samples.
    fn write_frame(&mut self, channels: &[&[i32]]) -> Result<()> {
        let n = channels[0].len();
        let bps = self.opts.bits_per_sample;

        // The stream signature runs over the original signal, independent of the channel
        // decorrelation chosen below.
        self.md5.update(channels, bps);

        let (assignment, plans) = self.choose_channel_plans(channels);

        let mut bw = BitWriter::with_capacity(n * channels.len() * 4 / 2 + 64);

        write_frame_header(
            &mut bw,
            0,
            self.frame_number,
            n as u16,
            self.opts.sample_rate,
            bps,
            assignment,
        );

        for (i, plan) in plans.iter().enumerate() {
            write_subframe(&mut bw, plan, channel_bps(bps, assignment, i));
        }

        bw.align_to_byte();

        let mut crc16 = Crc16Ansi::new(0);
        crc16.update(bw.written());
        bw.write_bits_leq32(u32::from(crc16.crc()), 16);

        let bytes = bw.into_bytes();

        if self.opts.verify {
            self.verify_frame(&bytes, channels)?;
        }

        let frame_offset = self.pos;

        self.sink.write_all(&bytes)?;
        self.pos += bytes.len() as u64;

        let frame_len = bytes.len() as u32;
        self.frame_byte_len_min = self.frame_byte_len_min.min(frame_len);
        self.frame_byte_len_max = self.frame_byte_len_max.max(frame_len);

        // Resolve seek table template points that land inside this frame, snapping them to the
        // frame boundary.
        let ts = self.next_sample;

        if let Some((_, _, table, resolved)) = &mut self.seek_table {
            let mut last_resolved = None;

            for (point, resolved) in table.points.iter_mut().zip(resolved.iter_mut()) {
                if *resolved {
                    last_resolved = Some(point.sample_number);
                    continue;
                }

                if point.is_placeholder() {
                    continue;
                }

                let in_frame = point.sample_number >= ts && point.sample_number < ts + n as u64;

                // Snapping to the frame start must keep the table strictly increasing.
                if in_frame && last_resolved != Some(ts) {
                    point.sample_number = ts;
                    point.stream_offset = frame_offset - self.first_frame_offset;
                    point.frame_samples = n as u16;

                    *resolved = true;
                    last_resolved = Some(ts);
                }
            }
        }

        self.frame_number += 1;
        self.next_sample += n as u64;

        Ok(())
    }

    /// Chooses the channel assignment and the subframe plan of each coded channel.
    fn choose_channel_plans(&self, channels: &[&[i32]]) -> (ChannelAssignment, Vec<SubframePlan>) {
        let bps = self.opts.bits_per_sample;

        if channels.len() != 2 || !self.opts.mid_side {
            let plans =
                channels.iter().map(|ch| plan_subframe(ch, bps, &self.sub_opts)).collect();

            return (ChannelAssignment::Independent(channels.len() as u32), plans);
        }

        let left = channels[0];
        let right = channels[1];

        let mid: Vec<i32> = left
            .iter()
            .zip(right)
            .map(|(&l, &r)| ((i64::from(l) + i64::from(r)) >> 1) as i32)
            .collect();
        let side: Vec<i32> = left.iter().zip(right).map(|(&l, &r)| l - r).collect();

        if self.opts.loose_mid_side {
            // A fast estimate: the smallest summed order-2 residual pair wins.
            let est_l = estimate_channel_cost(left);
            let est_r = estimate_channel_cost(right);
            let est_m = estimate_channel_cost(&mid);
            let est_s = estimate_channel_cost(&side);

            let candidates = [
                (ChannelAssignment::Independent(2), est_l + est_r),
                (ChannelAssignment::LeftSide, est_l + est_s),
                (ChannelAssignment::RightSide, est_s + est_r),
                (ChannelAssignment::MidSide, est_m + est_s),
            ];

            let assignment = candidates.iter().min_by_key(|(_, cost)| *cost).unwrap().0;

            let plans = match assignment {
                ChannelAssignment::Independent(_) => vec![
                    plan_subframe(left, bps, &self.sub_opts),
                    plan_subframe(right, bps, &self.sub_opts),
                ],
                ChannelAssignment::LeftSide => vec![
                    plan_subframe(left, bps, &self.sub_opts),
                    plan_subframe(&side, bps + 1, &self.sub_opts),
                ],
                ChannelAssignment::RightSide => vec![
                    plan_subframe(&side, bps + 1, &self.sub_opts),
                    plan_subframe(right, bps, &self.sub_opts),
                ],
                ChannelAssignment::MidSide => vec![
                    plan_subframe(&mid, bps, &self.sub_opts),
                    plan_subframe(&side, bps + 1, &self.sub_opts),
                ],
            };

            return (assignment, plans);
        }

        // Full evaluation: plan all four signals and keep the cheapest pairing.
        let plan_l = plan_subframe(left, bps, &self.sub_opts);
        let plan_r = plan_subframe(right, bps, &self.sub_opts);
        let plan_m = plan_subframe(&mid, bps, &self.sub_opts);
        let plan_s = plan_subframe(&side, bps + 1, &self.sub_opts);

        let cost_independent = plan_l.bits + plan_r.bits;
        let cost_left_side = plan_l.bits + plan_s.bits;
        let cost_right_side = plan_s.bits + plan_r.bits;
        let cost_mid_side = plan_m.bits + plan_s.bits;

        let best = cost_independent
            .min(cost_left_side)
            .min(cost_right_side)
            .min(cost_mid_side);

        if best == cost_independent {
            (ChannelAssignment::Independent(2), vec![plan_l, plan_r])
        }
        else if best == cost_left_side {
            (ChannelAssignment::LeftSide, vec![plan_l, plan_s])
        }
        else if best == cost_right_side {
            (ChannelAssignment::RightSide, vec![plan_s, plan_r])
        }
        else {
            (ChannelAssignment::MidSide, vec![plan_m, plan_s])
        }
    }

    /// Decodes an emitted frame from its bytes and compares every reconstructed sample with
    /// the original signal.
    fn verify_frame(&mut self, bytes: &[u8], channels: &[&[i32]]) -> Result<()> {
        let mut reader = BufReader::new(bytes);

        let sync = sync_frame(&mut reader)?;

        let mut crc16 = Crc16Ansi::new(0);
        crc16.update(&sync.to_be_bytes());

        let mut tapped = ChecksumReader::new(&mut reader, crc16);

        let header = read_frame_header(&mut tapped, sync)?;

        let crc_ok =
            read_frame_body(&mut tapped, &header, self.opts.bits_per_sample, &mut self.verify_buf)?;

        if !crc_ok {
            return decode_error("flac: verification decoder rejected the frame crc");
        }

        for (ch, original) in channels.iter().enumerate() {
            let decoded = self.verify_buf.chan(ch);

            for (i, (&expected, &got)) in original.iter().zip(decoded).enumerate() {
                if expected != got {
                    return Err(Error::VerifyMismatch(VerifyFailure {
                        sample: self.next_sample + i as u64,
                        channel: ch as u32,
                        expected,
                        got,
                    }));
                }
            }
        }

        Ok(())
    }
}

/// The coded sample width of channel `index` under a channel assignment: difference channels
/// carry one extra bit.
fn channel_bps(bps: u32, assignment: ChannelAssignment, index: usize) -> u32 {
    match assignment {
        ChannelAssignment::Independent(_) => bps,
        ChannelAssignment::LeftSide | ChannelAssignment::MidSide => {
            if index == 1 {
                bps + 1
            }
            else {
                bps
            }
        }
        ChannelAssignment::RightSide => {
            if index == 0 {
                bps + 1
            }
            else {
                bps
            }
        }
    }
}

/// The second-difference magnitude of a channel, a cheap stand-in for its coded size.
fn estimate_channel_cost(samples: &[i32]) -> u64 {
    let mut cost = 0u64;

    for window in samples.windows(3) {
        let e = i64::from(window[2]) - 2 * i64::from(window[1]) + i64::from(window[0]);
        cost += e.unsigned_abs();
    }

    cost
}

fn channels_spec(count: u32, rate: u32) -> carillon_core::audio::SignalSpec {
    let channels = format::channels_from_count(count).expect("validated channel count");
    carillon_core::audio::SignalSpec::new(rate, channels)
}
