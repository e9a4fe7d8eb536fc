// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides the planar sample buffer shared by the decoder, the encoder's
//! verification path, and callers.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// A bitmask of speaker positions describing the channels of an audio stream in order.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Channels: u32 {
        const FRONT_LEFT   = 0x0000_0001;
        const FRONT_RIGHT  = 0x0000_0002;
        const FRONT_CENTRE = 0x0000_0004;
        const LFE1         = 0x0000_0008;
        const REAR_LEFT    = 0x0000_0010;
        const REAR_RIGHT   = 0x0000_0020;
        const REAR_CENTRE  = 0x0000_0040;
        const SIDE_LEFT    = 0x0000_0080;
        const SIDE_RIGHT   = 0x0000_0100;
    }
}

impl Channels {
    /// Gets the number of channels in the mask.
    pub fn count(&self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#032b}", self.bits())
    }
}

/// `SignalSpec` describes the basic characteristics of an audio signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignalSpec {
    /// The signal sampling rate in hertz (Hz).
    pub rate: u32,
    /// The channel assignments of the signal.
    pub channels: Channels,
}

impl SignalSpec {
    pub fn new(rate: u32, channels: Channels) -> Self {
        SignalSpec { rate, channels }
    }
}

/// `AudioBuffer` is a planar buffer of interleave-free `i32` audio samples.
///
/// The buffer is allocated once for a maximum capacity of frames (a frame being one sample per
/// channel), and rendered in blocks of up-to that capacity. Samples of each channel are stored
/// contiguously in channel order.
pub struct AudioBuffer {
    buf: Vec<i32>,
    spec: SignalSpec,
    n_frames: usize,
    n_capacity: usize,
    /// Index of the first valid frame. Non-zero after trimming the front of the buffer.
    offset: usize,
}

impl AudioBuffer {
    /// Instantiate a new `AudioBuffer` with a capacity of `capacity` frames per channel.
    pub fn new(capacity: usize, spec: SignalSpec) -> Self {
        let n_channels = spec.channels.count();

        AudioBuffer {
            buf: vec![0i32; capacity * n_channels],
            spec,
            n_frames: 0,
            n_capacity: capacity,
            offset: 0,
        }
    }

    /// An `AudioBuffer` with no capacity.
    pub fn unused() -> Self {
        AudioBuffer {
            buf: Vec::new(),
            spec: SignalSpec::new(0, Channels::empty()),
            n_frames: 0,
            n_capacity: 0,
            offset: 0,
        }
    }

    /// Gets the signal specification of the buffer.
    pub fn spec(&self) -> &SignalSpec {
        &self.spec
    }

    /// Gets the number of valid frames in the buffer.
    pub fn frames(&self) -> usize {
        self.n_frames - self.offset
    }

    /// Gets the capacity of the buffer in frames.
    pub fn capacity(&self) -> usize {
        self.n_capacity
    }

    /// Clears all rendered frames.
    pub fn clear(&mut self) {
        self.n_frames = 0;
        self.offset = 0;
    }

    /// Makes `n_frames` frames valid for reading and writing. Panics if `n_frames` exceeds the
    /// buffer capacity.
    pub fn render_reserved(&mut self, n_frames: usize) {
        assert!(n_frames <= self.n_capacity, "render exceeds buffer capacity");
        self.n_frames = n_frames;
        self.offset = 0;
    }

    /// Trims `n_frames` frames from the front of the buffer.
    pub fn trim_start(&mut self, n_frames: usize) {
        self.offset = std::cmp::min(self.offset + n_frames, self.n_frames);
    }

    /// Gets an immutable slice of the samples of channel `ch`.
    pub fn chan(&self, ch: usize) -> &[i32] {
        let start = ch * self.n_capacity;
        &self.buf[start + self.offset..start + self.n_frames]
    }

    /// Gets a mutable slice of the samples of channel `ch`.
    pub fn chan_mut(&mut self, ch: usize) -> &mut [i32] {
        let start = ch * self.n_capacity;
        &mut self.buf[start + self.offset..start + self.n_frames]
    }

    /// Gets mutable slices of two distinct channels `first` and `second` where
    /// `first < second`.
    pub fn chan_pair_mut(&mut self, first: usize, second: usize) -> (&mut [i32], &mut [i32]) {
        assert!(first < second, "channels must be distinct and ordered");

        let (a, b) = self.buf.split_at_mut(second * self.n_capacity);

        let first_start = first * self.n_capacity;

        (
            &mut a[first_start + self.offset..first_start + self.n_frames],
            &mut b[self.offset..self.n_frames],
        )
    }

    /// Applies `f` to every valid sample of every channel.
    pub fn transform<F>(&mut self, f: F)
    where
        F: Fn(i32) -> i32,
    {
        let n_channels = self.spec.channels.count();

        for ch in 0..n_channels {
            for sample in self.chan_mut(ch) {
                *sample = f(*sample);
            }
        }
    }
}
