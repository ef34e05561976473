//! Interleaved sample blocks and per-block event buffers.
//!
//! Everything the realtime thread touches per block lives here. Blocks borrow
//! caller-owned memory and never allocate; [`EventBuffer`] is allocated once
//! with a fixed capacity and refuses events beyond it.

use core::ops::{Add, Mul};

/// Sample precision the rack can carry.
///
/// Implemented for `f32` and `f64`. Modules that declare no double-precision
/// support only ever see `f32` blocks; the rack converts on their behalf.
pub trait Sample:
    Copy + Default + PartialOrd + Send + Sync + 'static + Add<Output = Self> + Mul<Output = Self>
{
    /// Additive identity.
    const ZERO: Self;

    /// Widens or narrows from `f32`.
    fn from_f32(value: f32) -> Self;

    /// Widens or narrows to `f32`.
    fn to_f32(self) -> f32;

    /// Widens or narrows from `f64`.
    fn from_f64(value: f64) -> Self;

    /// Widens to `f64`.
    fn to_f64(self) -> f64;

    /// Absolute value.
    fn abs(self) -> Self;
}

impl Sample for f32 {
    const ZERO: Self = 0.0;

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn abs(self) -> Self {
        libm::fabsf(self)
    }
}

impl Sample for f64 {
    const ZERO: Self = 0.0;

    #[inline]
    fn from_f32(value: f32) -> Self {
        f64::from(value)
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn abs(self) -> Self {
        libm::fabs(self)
    }
}

/// A mutable view over an interleaved audio block.
///
/// Layout is `[L0, R0, L1, R1, ...]` for stereo; `data.len()` is always a
/// whole number of frames. Processing happens in place.
#[derive(Debug)]
pub struct AudioBlock<'a, T> {
    data: &'a mut [T],
    channels: usize,
}

impl<'a, T: Sample> AudioBlock<'a, T> {
    /// Wraps an interleaved buffer.
    ///
    /// A zero channel count is treated as mono. Trailing samples that do not
    /// make up a whole frame are excluded from the view.
    pub fn new(data: &'a mut [T], channels: usize) -> Self {
        let channels = channels.max(1);
        let whole = data.len() - data.len() % channels;
        Self {
            data: &mut data[..whole],
            channels,
        }
    }

    /// Number of interleaved channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels
    }

    /// Returns `true` if the block holds no frames.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The interleaved samples.
    #[inline]
    pub fn samples(&self) -> &[T] {
        &self.data[..]
    }

    /// The interleaved samples, mutably.
    #[inline]
    pub fn samples_mut(&mut self) -> &mut [T] {
        &mut self.data[..]
    }

    /// Iterates frames mutably; each item holds one sample per channel.
    #[inline]
    pub fn frames_mut(&mut self) -> core::slice::ChunksExactMut<'_, T> {
        self.data.chunks_exact_mut(self.channels)
    }

    /// Overwrites every sample with zero.
    #[inline]
    pub fn silence(&mut self) {
        self.data.fill(T::ZERO);
    }

    /// Largest absolute sample value in the block.
    pub fn peak(&self) -> f32 {
        self.data
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs().to_f32()))
    }

    /// Reborrows a sub-range of frames as a new block.
    ///
    /// `start..end` is clamped to the block length.
    pub fn slice_frames(&mut self, start: usize, end: usize) -> AudioBlock<'_, T> {
        let frames = self.frames();
        let end = end.min(frames);
        let start = start.min(end);
        AudioBlock {
            data: &mut self.data[start * self.channels..end * self.channels],
            channels: self.channels,
        }
    }
}

/// A short MIDI-style event positioned inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset from the start of the block.
    pub frame: u32,
    /// Raw status and data bytes.
    pub data: [u8; 3],
}

/// Fixed-capacity list of events delivered alongside a block.
///
/// Allocated once off the realtime thread. [`push`](Self::push) never grows
/// the storage, so filling it from a callback is safe.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Vec<MidiEvent>,
}

impl EventBuffer {
    /// An empty buffer with no capacity, usable from a `static`.
    pub const EMPTY: EventBuffer = EventBuffer { events: Vec::new() };

    /// Creates a buffer that can hold `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Appends an event. Returns `false` and drops the event when full.
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() == self.events.capacity() {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Removes all events, keeping the storage.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events in insertion order.
    pub fn iter(&self) -> core::slice::Iter<'_, MidiEvent> {
        self.events.iter()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_drops_partial_frame() {
        let mut data = [1.0f32; 7];
        let block = AudioBlock::new(&mut data, 2);
        assert_eq!(block.frames(), 3);
        assert_eq!(block.samples().len(), 6);
    }

    #[test]
    fn zero_channels_is_mono() {
        let mut data = [0.0f64; 4];
        let block = AudioBlock::new(&mut data, 0);
        assert_eq!(block.channels(), 1);
        assert_eq!(block.frames(), 4);
    }

    #[test]
    fn peak_uses_absolute_value() {
        let mut data = [0.1f32, -0.8, 0.5, 0.2];
        let block = AudioBlock::new(&mut data, 2);
        assert!((block.peak() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn slice_frames_clamps() {
        let mut data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let mut block = AudioBlock::new(&mut data, 2);
        let sub = block.slice_frames(3, 10);
        assert_eq!(sub.frames(), 1);
        assert_eq!(sub.samples(), &[6.0, 7.0]);
    }

    #[test]
    fn silence_zeroes_everything() {
        let mut data = [0.3f32; 6];
        AudioBlock::new(&mut data, 3).silence();
        assert!(data.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn event_buffer_never_grows() {
        let mut events = EventBuffer::with_capacity(2);
        let ev = MidiEvent {
            frame: 0,
            data: [0x90, 60, 100],
        };
        assert!(events.push(ev));
        assert!(events.push(ev));
        assert!(!events.push(ev));
        assert_eq!(events.len(), 2);
        events.clear();
        assert!(events.is_empty());
        assert!(events.push(ev));
    }

    #[test]
    fn empty_event_buffer_rejects_push() {
        let mut events = EventBuffer::EMPTY;
        assert!(!events.push(MidiEvent {
            frame: 0,
            data: [0; 3]
        }));
    }
}
