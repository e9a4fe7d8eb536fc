// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-memory metadata block model and its bitstream codec.

use std::io;
use std::io::Write;

use carillon_core::errors::{decode_error, metadata_error, Error, Result};
use carillon_core::io::{BitWriter, ReadBytes};

/// The byte length of a metadata block header.
pub const BLOCK_HEADER_LEN: u32 = 4;

/// The sample number marking an unused seek point slot.
pub const SEEK_POINT_PLACEHOLDER: u64 = u64::MAX;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetadataBlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Unknown(u8),
}

impl MetadataBlockType {
    pub fn code(&self) -> u8 {
        match *self {
            MetadataBlockType::StreamInfo => 0,
            MetadataBlockType::Padding => 1,
            MetadataBlockType::Application => 2,
            MetadataBlockType::SeekTable => 3,
            MetadataBlockType::VorbisComment => 4,
            MetadataBlockType::CueSheet => 5,
            MetadataBlockType::Picture => 6,
            MetadataBlockType::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u8) -> MetadataBlockType {
        match code {
            0 => MetadataBlockType::StreamInfo,
            1 => MetadataBlockType::Padding,
            2 => MetadataBlockType::Application,
            3 => MetadataBlockType::SeekTable,
            4 => MetadataBlockType::VorbisComment,
            5 => MetadataBlockType::CueSheet,
            6 => MetadataBlockType::Picture,
            _ => MetadataBlockType::Unknown(code),
        }
    }
}

pub struct MetadataBlockHeader {
    pub is_last: bool,
    pub block_type: MetadataBlockType,
    pub block_len: u32,
}

impl MetadataBlockHeader {
    /// Read a metadata block header.
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<MetadataBlockHeader> {
        let header_enc = reader.read_u8()?;

        // First bit of the header indicates if this is the last metadata block.
        let is_last = (header_enc & 0x80) == 0x80;

        // The next 7 bits of the header indicate the block type.
        let block_type_id = header_enc & 0x7f;

        if block_type_id == 0x7f {
            return decode_error("flac: invalid metadata block type");
        }

        let block_type = MetadataBlockType::from_code(block_type_id);

        let block_len = reader.read_be_u24()?;

        Ok(MetadataBlockHeader { is_last, block_type, block_len })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let byte = (u8::from(self.is_last) << 7) | (self.block_type.code() & 0x7f);

        writer.write_all(&[byte])?;
        writer.write_all(&self.block_len.to_be_bytes()[1..4])?;

        Ok(())
    }
}

/// The stream information block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamInfo {
    /// The minimum and maximum number of decoded samples per block of audio.
    pub block_len_min: u16,
    pub block_len_max: u16,
    /// The minimum and maximum byte length of an encoded block (frame) of audio. Either value
    /// may be 0 if unknown.
    pub frame_byte_len_min: u32,
    pub frame_byte_len_max: u32,
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The number of channels, between 1 and 8.
    pub channels: u32,
    /// The number of bits per sample of the stream.
    pub bits_per_sample: u32,
    /// The total number of samples per channel in the stream, if known.
    pub n_samples: Option<u64>,
    /// The MD5 signature of the decoded audio data, if known.
    pub md5: Option<[u8; 16]>,
}

impl StreamInfo {
    const BODY_LEN: u32 = 34;

    /// Read a stream information block.
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<StreamInfo> {
        let mut info = StreamInfo::default();

        // Read the block length bounds in number of samples.
        info.block_len_min = reader.read_be_u16()?;
        info.block_len_max = reader.read_be_u16()?;

        // Validate the block length bounds are in the range [16, 65535] samples.
        if info.block_len_min < 16 || info.block_len_max < 16 {
            return decode_error("flac: minimum block length is 16 samples");
        }

        // Validate the maximum block length is greater than or equal to the minimum block
        // length.
        if info.block_len_max < info.block_len_min {
            return decode_error("flac: maximum block length is less than the minimum block length");
        }

        // Read the frame byte length bounds.
        info.frame_byte_len_min = reader.read_be_u24()?;
        info.frame_byte_len_max = reader.read_be_u24()?;

        // Validate the maximum frame byte length is greater than or equal to the minimum frame
        // byte length if both are known. A value of 0 for either indicates the respective byte
        // length is unknown.
        if info.frame_byte_len_min > 0
            && info.frame_byte_len_max > 0
            && info.frame_byte_len_max < info.frame_byte_len_min
        {
            return decode_error("flac: maximum frame length is less than the minimum frame length");
        }

        // The remaining fields are tightly bit-packed.
        let packed = reader.read_be_u64()?;

        // Sample rate, 20 bits. Valid rates are [1, 655350] Hz.
        info.sample_rate = (packed >> 44) as u32;

        if info.sample_rate < 1 || info.sample_rate > 655_350 {
            return decode_error("flac: stream sample rate out of bounds");
        }

        // Number of channels minus 1, 3 bits.
        info.channels = ((packed >> 41) & 0x7) as u32 + 1;

        // Bits per sample minus 1, 5 bits. Valid widths are [4, 32] bits.
        info.bits_per_sample = ((packed >> 36) & 0x1f) as u32 + 1;

        if info.bits_per_sample < 4 {
            return decode_error("flac: stream bits per sample are out of bounds");
        }

        // Total samples per channel, 36 bits. A value of 0 indicates a stream of unknown
        // length.
        info.n_samples = match packed & 0x000f_ffff_ffff {
            0 => None,
            samples => Some(samples),
        };

        // The decoded audio data MD5 signature. All zeros means no signature is present.
        let mut md5 = [0; 16];
        reader.read_buf_exact(&mut md5)?;

        if md5 != [0; 16] {
            info.md5 = Some(md5);
        }

        Ok(info)
    }

    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut bw = BitWriter::with_capacity(StreamInfo::BODY_LEN as usize);

        bw.write_bits_leq32(u32::from(self.block_len_min), 16);
        bw.write_bits_leq32(u32::from(self.block_len_max), 16);
        bw.write_bits_leq32(self.frame_byte_len_min, 24);
        bw.write_bits_leq32(self.frame_byte_len_max, 24);
        bw.write_bits_leq32(self.sample_rate, 20);
        bw.write_bits_leq32(self.channels - 1, 3);
        bw.write_bits_leq32(self.bits_per_sample - 1, 5);
        bw.write_bits_leq64(self.n_samples.unwrap_or(0), 36);

        writer.write_all(&bw.into_bytes())?;
        writer.write_all(&self.md5.unwrap_or([0; 16]))?;

        Ok(())
    }

    /// Check if the size is valid for a stream information block.
    pub fn is_valid_size(size: u64) -> bool {
        size == u64::from(StreamInfo::BODY_LEN)
    }
}

/// A padding block: a run of zero bytes reserved for future metadata growth.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Padding {
    /// The body length of the padding in bytes.
    pub len: u32,
}

/// An application block: a registered 4-byte identifier and an opaque payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Application {
    pub ident: [u8; 4],
    pub data: Box<[u8]>,
}

impl Application {
    pub fn read<B: ReadBytes>(reader: &mut B, block_len: u32) -> Result<Application> {
        if block_len < 4 {
            return decode_error("flac: application block is too short");
        }

        let ident = reader.read_quad_bytes()?;
        let data = reader.read_boxed_slice_exact(block_len as usize - 4)?;

        Ok(Application { ident, data })
    }
}

/// One entry of a seek table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeekPoint {
    /// The first sample of the target frame, or [`SEEK_POINT_PLACEHOLDER`] for an unused slot.
    pub sample_number: u64,
    /// The byte offset of the target frame from the first frame.
    pub stream_offset: u64,
    /// The number of samples in the target frame.
    pub frame_samples: u16,
}

impl SeekPoint {
    pub const PLACEHOLDER: SeekPoint =
        SeekPoint { sample_number: SEEK_POINT_PLACEHOLDER, stream_offset: 0, frame_samples: 0 };

    pub fn is_placeholder(&self) -> bool {
        self.sample_number == SEEK_POINT_PLACEHOLDER
    }
}

/// A seek table block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeekTable {
    pub points: Vec<SeekPoint>,
}

impl SeekTable {
    const POINT_LEN: u32 = 18;

    pub fn read<B: ReadBytes>(reader: &mut B, block_len: u32) -> Result<SeekTable> {
        if block_len % SeekTable::POINT_LEN != 0 {
            return decode_error("flac: seek table length is not a multiple of the point length");
        }

        let count = block_len / SeekTable::POINT_LEN;

        let mut points = Vec::with_capacity(count as usize);

        for _ in 0..count {
            points.push(SeekPoint {
                sample_number: reader.read_be_u64()?,
                stream_offset: reader.read_be_u64()?,
                frame_samples: reader.read_be_u16()?,
            });
        }

        Ok(SeekTable { points })
    }

    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        for point in &self.points {
            writer.write_all(&point.sample_number.to_be_bytes())?;
            writer.write_all(&point.stream_offset.to_be_bytes())?;
            writer.write_all(&point.frame_samples.to_be_bytes())?;
        }

        Ok(())
    }

    /// True when all non-placeholder points are strictly increasing in sample number and
    /// placeholders, if any, trail them.
    pub fn is_legal(&self) -> bool {
        let mut prev: Option<u64> = None;
        let mut seen_placeholder = false;

        for point in &self.points {
            if point.is_placeholder() {
                seen_placeholder = true;
                continue;
            }

            if seen_placeholder {
                return false;
            }

            if let Some(prev) = prev {
                if point.sample_number <= prev {
                    return false;
                }
            }

            prev = Some(point.sample_number);
        }

        true
    }

    /// Appends `count` placeholder points.
    pub fn template_append_placeholders(&mut self, count: usize) {
        self.points.extend(std::iter::repeat(SeekPoint::PLACEHOLDER).take(count));
    }

    /// Appends `count` template points spread evenly over `total_samples` samples. The points
    /// carry only target sample numbers; the encoder resolves their offsets.
    pub fn template_append_spaced_points(&mut self, count: usize, total_samples: u64) -> Result<()> {
        if count == 0 || total_samples == 0 {
            return metadata_error("flac: spaced seek points require a count and a stream length");
        }

        for i in 0..count {
            let sample_number = (i as u64 * total_samples) / count as u64;
            self.points.push(SeekPoint { sample_number, stream_offset: 0, frame_samples: 0 });
        }

        Ok(())
    }

    /// Sorts points by sample number with placeholders last, and drops duplicate sample
    /// numbers. Placeholders are never deduplicated. Idempotent.
    pub fn template_sort(&mut self) {
        self.points.sort_by_key(|p| p.sample_number);
        self.points.dedup_by(|a, b| !a.is_placeholder() && a.sample_number == b.sample_number);
    }
}

/// A Vorbis comment block: a vendor string and a list of `NAME=VALUE` entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VorbisComment {
    pub vendor: String,
    comments: Vec<String>,
}

/// True when every byte of a comment name is printable ASCII excluding '='.
fn is_valid_comment_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (0x20..=0x7d).contains(&b) && b != b'=')
}

impl VorbisComment {
    pub fn new(vendor: &str) -> VorbisComment {
        VorbisComment { vendor: vendor.to_string(), comments: Vec::new() }
    }

    pub fn read<B: ReadBytes>(reader: &mut B, block_len: u32) -> Result<VorbisComment> {
        // All length fields of this block are little-endian, inherited from the Vorbis
        // specification.
        let vendor_len = reader.read_u32()?;

        if vendor_len > block_len {
            return decode_error("flac: comment vendor string length exceeds block");
        }

        let vendor_buf = reader.read_boxed_slice_exact(vendor_len as usize)?;

        let vendor = String::from_utf8(vendor_buf.into_vec())
            .map_err(|_| Error::DecodeError("flac: comment is not valid UTF-8"))?;

        let count = reader.read_u32()?;

        // Each entry carries at minimum a 4-byte length.
        let mut comments = Vec::with_capacity(count.min(block_len / 4) as usize);

        for _ in 0..count {
            let len = reader.read_u32()?;

            if len > block_len {
                return decode_error("flac: comment length exceeds block");
            }

            let buf = reader.read_boxed_slice_exact(len as usize)?;

            comments.push(
                String::from_utf8(buf.into_vec())
                    .map_err(|_| Error::DecodeError("flac: comment is not valid UTF-8"))?,
            );
        }

        Ok(VorbisComment { vendor, comments })
    }

    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&(self.vendor.len() as u32).to_le_bytes())?;
        writer.write_all(self.vendor.as_bytes())?;
        writer.write_all(&(self.comments.len() as u32).to_le_bytes())?;

        for comment in &self.comments {
            writer.write_all(&(comment.len() as u32).to_le_bytes())?;
            writer.write_all(comment.as_bytes())?;
        }

        Ok(())
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// The value of the first comment with the given name, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.comments.iter().find_map(|comment| {
            let (n, v) = comment.split_once('=')?;
            n.eq_ignore_ascii_case(name).then_some(v)
        })
    }

    /// Appends a `NAME=VALUE` entry.
    pub fn push(&mut self, name: &str, value: &str) -> Result<()> {
        if !is_valid_comment_name(name) {
            return metadata_error("flac: comment name contains illegal characters");
        }

        self.comments.push(format!("{}={}", name, value));
        Ok(())
    }

    /// Replaces the first entry with the given name, removing any further entries of the same
    /// name, or appends when absent.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if !is_valid_comment_name(name) {
            return metadata_error("flac: comment name contains illegal characters");
        }

        self.remove_all(name);
        self.comments.push(format!("{}={}", name, value));
        Ok(())
    }

    /// Removes every entry with the given name and returns how many were removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.comments.len();

        self.comments.retain(|comment| match comment.split_once('=') {
            Some((n, _)) => !n.eq_ignore_ascii_case(name),
            None => true,
        });

        before - self.comments.len()
    }

    fn body_len(&self) -> u32 {
        let comments_len: usize = self.comments.iter().map(|c| 4 + c.len()).sum();
        (4 + self.vendor.len() + 4 + comments_len) as u32
    }
}

/// One index of a cue sheet track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CueSheetTrackIndex {
    /// Offset in samples relative to the track offset.
    pub offset: u64,
    pub number: u8,
}

/// One track of a cue sheet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CueSheetTrack {
    /// Offset of the first index point in samples, relative to the start of the stream.
    pub offset: u64,
    /// The track number: 1-99, or 170 for the lead-out on CD-DA.
    pub number: u8,
    /// The 12 character international standard recording code.
    pub isrc: String,
    pub is_audio: bool,
    pub pre_emphasis: bool,
    pub indices: Vec<CueSheetTrackIndex>,
}

/// A cue sheet block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CueSheet {
    /// The media catalog number in printable ASCII, at most 128 characters.
    pub catalog_number: String,
    /// The number of lead-in samples. Only meaningful for CD-DA.
    pub lead_in: u64,
    pub is_cdda: bool,
    pub tracks: Vec<CueSheetTrack>,
}

/// Converts a fixed-length field of bytes to an ASCII string if all characters are within the
/// printable ASCII range. A null byte terminates the string early.
fn printable_ascii_to_string(bytes: &[u8]) -> Option<String> {
    let mut result = String::with_capacity(bytes.len());

    for c in bytes {
        match c {
            0x00 => break,
            0x20..=0x7e => result.push(char::from(*c)),
            _ => return None,
        }
    }

    Some(result)
}

impl CueSheet {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<CueSheet> {
        // The catalog number only allows printable ASCII characters.
        let mut catalog_number_buf = [0u8; 128];
        reader.read_buf_exact(&mut catalog_number_buf)?;

        let catalog_number = match printable_ascii_to_string(&catalog_number_buf) {
            Some(s) => s,
            None => {
                return decode_error("flac: cuesheet catalog number contains invalid characters")
            }
        };

        let lead_in = reader.read_be_u64()?;

        let is_cdda = (reader.read_u8()? & 0x80) == 0x80;

        // The next 258 bytes are reserved and must be zero.
        for _ in 0..129 {
            if reader.read_be_u16()? != 0 {
                return decode_error("flac: cuesheet reserved bits should be zero");
            }
        }

        let n_tracks = reader.read_u8()?;

        let mut tracks = Vec::with_capacity(usize::from(n_tracks));

        for _ in 0..n_tracks {
            tracks.push(CueSheet::read_track(reader)?);
        }

        Ok(CueSheet { catalog_number, lead_in, is_cdda, tracks })
    }

    fn read_track<B: ReadBytes>(reader: &mut B) -> Result<CueSheetTrack> {
        let offset = reader.read_be_u64()?;
        let number = reader.read_u8()?;

        let mut isrc_buf = [0u8; 12];
        reader.read_buf_exact(&mut isrc_buf)?;

        let isrc = match printable_ascii_to_string(&isrc_buf) {
            Some(s) => s,
            None => return decode_error("flac: cuesheet track ISRC contains invalid characters"),
        };

        // The next 14 bytes are reserved, except the leading two flag bits.
        let flags = reader.read_be_u16()?;

        let is_audio = (flags & 0x8000) == 0x0000;
        let pre_emphasis = (flags & 0x4000) == 0x4000;

        if flags & 0x3fff != 0 {
            return decode_error("flac: cuesheet track reserved bits should be zero");
        }

        for _ in 0..3 {
            if reader.read_be_u32()? != 0 {
                return decode_error("flac: cuesheet track reserved bits should be zero");
            }
        }

        let n_indices = reader.read_u8()?;

        let mut indices = Vec::with_capacity(usize::from(n_indices));

        for _ in 0..n_indices {
            indices.push(CueSheet::read_track_index(reader)?);
        }

        Ok(CueSheetTrack { offset, number, isrc, is_audio, pre_emphasis, indices })
    }

    fn read_track_index<B: ReadBytes>(reader: &mut B) -> Result<CueSheetTrackIndex> {
        let offset = reader.read_be_u64()?;
        let index_enc = reader.read_be_u32()?;

        if index_enc & 0x00ff_ffff != 0 {
            return decode_error("flac: cuesheet track index reserved bits should be zero");
        }

        Ok(CueSheetTrackIndex { offset, number: ((index_enc & 0xff00_0000) >> 24) as u8 })
    }

    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut catalog = [0u8; 128];
        catalog[..self.catalog_number.len()].copy_from_slice(self.catalog_number.as_bytes());

        writer.write_all(&catalog)?;
        writer.write_all(&self.lead_in.to_be_bytes())?;
        writer.write_all(&[if self.is_cdda { 0x80 } else { 0x00 }])?;
        writer.write_all(&[0u8; 258])?;
        writer.write_all(&[self.tracks.len() as u8])?;

        for track in &self.tracks {
            writer.write_all(&track.offset.to_be_bytes())?;
            writer.write_all(&[track.number])?;

            let mut isrc = [0u8; 12];
            isrc[..track.isrc.len()].copy_from_slice(track.isrc.as_bytes());
            writer.write_all(&isrc)?;

            let mut flags = 0u16;
            if !track.is_audio {
                flags |= 0x8000;
            }
            if track.pre_emphasis {
                flags |= 0x4000;
            }

            writer.write_all(&flags.to_be_bytes())?;
            writer.write_all(&[0u8; 12])?;
            writer.write_all(&[track.indices.len() as u8])?;

            for index in &track.indices {
                writer.write_all(&index.offset.to_be_bytes())?;
                writer.write_all(&[index.number, 0, 0, 0])?;
            }
        }

        Ok(())
    }

    fn body_len(&self) -> u32 {
        let tracks_len: usize = self.tracks.iter().map(|t| 36 + 12 * t.indices.len()).sum();
        (128 + 8 + 1 + 258 + 1 + tracks_len) as u32
    }

    /// Checks the structural legality of the cue sheet. With `check_cdda`, the additional
    /// constraints of an audio CD are enforced: sample offsets on 1/75th second boundaries,
    /// track numbers 1-99 (or 170 for lead-out), and a final lead-out track.
    pub fn is_legal(&self, check_cdda: bool) -> std::result::Result<(), &'static str> {
        if self.catalog_number.len() > 128 {
            return Err("catalog number is too long");
        }

        if self.tracks.is_empty() {
            return Err("cue sheet must have at least one track (the lead-out)");
        }

        if self.tracks.iter().any(|t| t.isrc.len() != 0 && t.isrc.len() != 12) {
            return Err("ISRC must be empty or 12 characters");
        }

        if self.tracks.iter().any(|t| t.number == 0) {
            return Err("track number 0 is not allowed");
        }

        for track in &self.tracks[..self.tracks.len() - 1] {
            if track.indices.is_empty() {
                return Err("every track except the lead-out must have at least one index");
            }
        }

        if check_cdda {
            if self.tracks.len() > 100 {
                return Err("CD-DA cue sheets must have no more than 100 tracks");
            }

            if self.tracks.last().map(|t| t.number) != Some(170) {
                return Err("CD-DA cue sheets must end with the lead-out track (number 170)");
            }

            for track in &self.tracks {
                if track.number > 99 && track.number != 170 {
                    return Err("CD-DA track numbers must be 1-99 or 170");
                }

                if track.offset % 588 != 0 {
                    return Err("CD-DA track offsets must be multiples of 588 samples");
                }

                for index in &track.indices {
                    if index.offset % 588 != 0 {
                        return Err("CD-DA index offsets must be multiples of 588 samples");
                    }
                }
            }
        }

        Ok(())
    }
}

/// A picture block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Picture {
    /// The picture type code, following the ID3v2 APIC scheme.
    pub picture_type: u32,
    /// The media type (MIME type) of the picture data.
    pub media_type: String,
    /// A description of the picture.
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// For indexed-color pictures, the number of colors used, otherwise 0.
    pub indexed_colors: u32,
    pub data: Box<[u8]>,
}

impl Picture {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<Picture> {
        let picture_type = reader.read_be_u32()?;

        let media_type_len = reader.read_be_u32()? as usize;
        let media_type_buf = reader.read_boxed_slice_exact(media_type_len)?;

        // The media type is restricted to printable ASCII.
        let media_type = match printable_ascii_to_string(&media_type_buf) {
            Some(s) => s,
            None => return decode_error("flac: picture media type contains invalid characters"),
        };

        let desc_len = reader.read_be_u32()? as usize;
        let desc_buf = reader.read_boxed_slice_exact(desc_len)?;

        let description = String::from_utf8(desc_buf.into_vec())
            .map_err(|_| Error::DecodeError("flac: picture description is not valid UTF-8"))?;

        let width = reader.read_be_u32()?;
        let height = reader.read_be_u32()?;
        let bits_per_pixel = reader.read_be_u32()?;
        let indexed_colors = reader.read_be_u32()?;

        let data_len = reader.read_be_u32()? as usize;
        let data = reader.read_boxed_slice_exact(data_len)?;

        Ok(Picture {
            picture_type,
            media_type,
            description,
            width,
            height,
            bits_per_pixel,
            indexed_colors,
            data,
        })
    }

    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.picture_type.to_be_bytes())?;
        writer.write_all(&(self.media_type.len() as u32).to_be_bytes())?;
        writer.write_all(self.media_type.as_bytes())?;
        writer.write_all(&(self.description.len() as u32).to_be_bytes())?;
        writer.write_all(self.description.as_bytes())?;
        writer.write_all(&self.width.to_be_bytes())?;
        writer.write_all(&self.height.to_be_bytes())?;
        writer.write_all(&self.bits_per_pixel.to_be_bytes())?;
        writer.write_all(&self.indexed_colors.to_be_bytes())?;
        writer.write_all(&(self.data.len() as u32).to_be_bytes())?;
        writer.write_all(&self.data)?;

        Ok(())
    }

    fn body_len(&self) -> u32 {
        (8 + self.media_type.len() + 4 + self.description.len() + 16 + 4 + self.data.len()) as u32
    }
}

/// A reserved or unrecognized block, preserved verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownBlock {
    pub block_type: u8,
    pub data: Box<[u8]>,
}

/// An owned metadata block of any type.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataBlock {
    StreamInfo(StreamInfo),
    Padding(Padding),
    Application(Application),
    SeekTable(SeekTable),
    VorbisComment(VorbisComment),
    CueSheet(CueSheet),
    Picture(Picture),
    Unknown(UnknownBlock),
}

impl MetadataBlock {
    /// Parses the body of a block of the type and length given by `header`.
    pub fn read<B: ReadBytes>(reader: &mut B, header: &MetadataBlockHeader) -> Result<MetadataBlock> {
        let block = match header.block_type {
            MetadataBlockType::StreamInfo => {
                if !StreamInfo::is_valid_size(u64::from(header.block_len)) {
                    return decode_error("flac: invalid stream info block size");
                }

                MetadataBlock::StreamInfo(StreamInfo::read(reader)?)
            }
            MetadataBlockType::Padding => {
                reader.ignore_bytes(u64::from(header.block_len))?;
                MetadataBlock::Padding(Padding { len: header.block_len })
            }
            MetadataBlockType::Application => {
                MetadataBlock::Application(Application::read(reader, header.block_len)?)
            }
            MetadataBlockType::SeekTable => {
                MetadataBlock::SeekTable(SeekTable::read(reader, header.block_len)?)
            }
            MetadataBlockType::VorbisComment => {
                MetadataBlock::VorbisComment(VorbisComment::read(reader, header.block_len)?)
            }
            MetadataBlockType::CueSheet => MetadataBlock::CueSheet(CueSheet::read(reader)?),
            MetadataBlockType::Picture => MetadataBlock::Picture(Picture::read(reader)?),
            MetadataBlockType::Unknown(block_type) => MetadataBlock::Unknown(UnknownBlock {
                block_type,
                data: reader.read_boxed_slice_exact(header.block_len as usize)?,
            }),
        };

        Ok(block)
    }

    pub fn block_type(&self) -> MetadataBlockType {
        match self {
            MetadataBlock::StreamInfo(_) => MetadataBlockType::StreamInfo,
            MetadataBlock::Padding(_) => MetadataBlockType::Padding,
            MetadataBlock::Application(_) => MetadataBlockType::Application,
            MetadataBlock::SeekTable(_) => MetadataBlockType::SeekTable,
            MetadataBlock::VorbisComment(_) => MetadataBlockType::VorbisComment,
            MetadataBlock::CueSheet(_) => MetadataBlockType::CueSheet,
            MetadataBlock::Picture(_) => MetadataBlockType::Picture,
            MetadataBlock::Unknown(block) => MetadataBlockType::Unknown(block.block_type),
        }
    }

    /// The body length in bytes the block will occupy when written.
    pub fn body_len(&self) -> u32 {
        match self {
            MetadataBlock::StreamInfo(_) => StreamInfo::BODY_LEN,
            MetadataBlock::Padding(padding) => padding.len,
            MetadataBlock::Application(app) => 4 + app.data.len() as u32,
            MetadataBlock::SeekTable(table) => {
                table.points.len() as u32 * SeekTable::POINT_LEN
            }
            MetadataBlock::VorbisComment(comment) => comment.body_len(),
            MetadataBlock::CueSheet(cuesheet) => cuesheet.body_len(),
            MetadataBlock::Picture(picture) => picture.body_len(),
            MetadataBlock::Unknown(block) => block.data.len() as u32,
        }
    }

    /// The total length of the block when written, including its header.
    pub fn total_len(&self) -> u64 {
        u64::from(BLOCK_HEADER_LEN) + u64::from(self.body_len())
    }

    /// Writes the block, header included, to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W, is_last: bool) -> Result<()> {
        let header = MetadataBlockHeader {
            is_last,
            block_type: self.block_type(),
            block_len: self.body_len(),
        };

        header.write(writer)?;

        match self {
            MetadataBlock::StreamInfo(info) => info.write_body(writer)?,
            MetadataBlock::Padding(padding) => {
                write_zeros(writer, padding.len as usize)?;
            }
            MetadataBlock::Application(app) => {
                writer.write_all(&app.ident)?;
                writer.write_all(&app.data)?;
            }
            MetadataBlock::SeekTable(table) => table.write_body(writer)?,
            MetadataBlock::VorbisComment(comment) => comment.write_body(writer)?,
            MetadataBlock::CueSheet(cuesheet) => cuesheet.write_body(writer)?,
            MetadataBlock::Picture(picture) => picture.write_body(writer)?,
            MetadataBlock::Unknown(block) => writer.write_all(&block.data)?,
        }

        Ok(())
    }
}

fn write_zeros<W: Write>(writer: &mut W, mut count: usize) -> io::Result<()> {
    let zeros = [0u8; 1024];

    while count > 0 {
        let n = count.min(zeros.len());
        writer.write_all(&zeros[..n])?;
        count -= n;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use carillon_core::io::BufReader;

    use super::*;

    fn roundtrip(block: &MetadataBlock) {
        let mut bytes = Vec::new();
        block.write_to(&mut bytes, true).unwrap();

        let mut reader = BufReader::new(&bytes);
        let header = MetadataBlockHeader::read(&mut reader).unwrap();

        assert!(header.is_last);
        assert_eq!(header.block_type, block.block_type());
        assert_eq!(u64::from(header.block_len), block.total_len() - 4);

        let read_back = MetadataBlock::read(&mut reader, &header).unwrap();

        assert_eq!(&read_back, block);
    }

    #[test]
    fn verify_stream_info_roundtrip() {
        roundtrip(&MetadataBlock::StreamInfo(StreamInfo {
            block_len_min: 4096,
            block_len_max: 4096,
            frame_byte_len_min: 14,
            frame_byte_len_max: 1024,
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            n_samples: Some(88_200),
            md5: Some([0xab; 16]),
        }));

        roundtrip(&MetadataBlock::StreamInfo(StreamInfo {
            block_len_min: 16,
            block_len_max: 65_535,
            frame_byte_len_min: 0,
            frame_byte_len_max: 0,
            sample_rate: 655_350,
            channels: 8,
            bits_per_sample: 32,
            n_samples: None,
            md5: None,
        }));
    }

    #[test]
    fn verify_padding_and_application_roundtrip() {
        roundtrip(&MetadataBlock::Padding(Padding { len: 0 }));
        roundtrip(&MetadataBlock::Padding(Padding { len: 1024 }));
        roundtrip(&MetadataBlock::Application(Application {
            ident: *b"ates",
            data: vec![1, 2, 3, 4, 5].into_boxed_slice(),
        }));
    }

    #[test]
    fn verify_seek_table_roundtrip_and_legality() {
        let mut table = SeekTable::default();
        table.points.push(SeekPoint { sample_number: 0, stream_offset: 0, frame_samples: 4096 });
        table.points.push(SeekPoint {
            sample_number: 44_100,
            stream_offset: 8_192,
            frame_samples: 4096,
        });
        table.template_append_placeholders(2);

        assert!(table.is_legal());

        roundtrip(&MetadataBlock::SeekTable(table.clone()));

        // Out of order points are illegal, sorting restores legality.
        table.points.swap(0, 1);
        assert!(!table.is_legal());

        table.template_sort();
        assert!(table.is_legal());

        // Sorting is idempotent.
        let sorted = table.clone();
        table.template_sort();
        assert_eq!(table, sorted);
    }

    #[test]
    fn verify_vorbis_comment_roundtrip() {
        let mut comment = VorbisComment::new("carillon test vendor");
        comment.push("TITLE", "A Song").unwrap();
        comment.push("ARTIST", "Somebody").unwrap();
        comment.push("TITLE", "An Alias").unwrap();

        assert_eq!(comment.get("title"), Some("A Song"));

        comment.set("Title", "The Song").unwrap();
        assert_eq!(comment.get("TITLE"), Some("The Song"));
        assert_eq!(comment.comments().len(), 2);

        assert!(comment.push("BAD=NAME", "x").is_err());
        assert!(comment.push("", "x").is_err());

        roundtrip(&MetadataBlock::VorbisComment(comment));
    }

    #[test]
    fn verify_cue_sheet_roundtrip_and_legality() {
        let cuesheet = CueSheet {
            catalog_number: "1234567890123".to_string(),
            lead_in: 88_200,
            is_cdda: true,
            tracks: vec![
                CueSheetTrack {
                    offset: 0,
                    number: 1,
                    isrc: "USRC17607839".to_string(),
                    is_audio: true,
                    pre_emphasis: false,
                    indices: vec![
                        CueSheetTrackIndex { offset: 0, number: 1 },
                        CueSheetTrackIndex { offset: 588 * 75, number: 2 },
                    ],
                },
                CueSheetTrack {
                    offset: 588 * 7500,
                    number: 170,
                    isrc: String::new(),
                    is_audio: true,
                    pre_emphasis: false,
                    indices: Vec::new(),
                },
            ],
        };

        assert!(cuesheet.is_legal(true).is_ok());

        roundtrip(&MetadataBlock::CueSheet(cuesheet.clone()));

        let mut bad = cuesheet.clone();
        bad.tracks[0].offset = 17;
        assert!(bad.is_legal(true).is_err());
        assert!(bad.is_legal(false).is_ok());
    }

    #[test]
    fn verify_picture_and_unknown_roundtrip() {
        roundtrip(&MetadataBlock::Picture(Picture {
            picture_type: 3,
            media_type: "image/png".to_string(),
            description: "front cover".to_string(),
            width: 600,
            height: 600,
            bits_per_pixel: 24,
            indexed_colors: 0,
            data: vec![0x89, 0x50, 0x4e, 0x47].into_boxed_slice(),
        }));

        roundtrip(&MetadataBlock::Unknown(UnknownBlock {
            block_type: 99,
            data: vec![7; 33].into_boxed_slice(),
        }));
    }
}
