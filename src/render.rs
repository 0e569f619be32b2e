/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
/*! Pulse rendering into audio sample buffers.

[PulseRenderer] is the consumer end of the [PulseRing]: it runs in the
render context, the fixed-period audio or GPIO callback, and turns queued
pulse runs into output samples. It never blocks and never allocates.

The pin level maps to the two amplitude extremes of the sample type; while
the ring is not yet marked ready the whole buffer is filled with silence.
An underrun holds the last emitted sample flat, a pulse train interrupted
mid-run must never pop.
*/
use std::sync::Arc;

use log::debug;

use crate::carousel::PulseRing;

/// A type usable as an output sample.
pub trait AudioSample: Copy + Send + Default + 'static {
    /// The value of a silent sample.
    #[inline(always)]
    fn silence() -> Self {
        Self::default()
    }
    fn max_pos_amplitude() -> Self;
    fn max_neg_amplitude() -> Self;
}

impl AudioSample for f32 {
    #[inline(always)] fn max_pos_amplitude() -> Self {  1.0 }
    #[inline(always)] fn max_neg_amplitude() -> Self { -1.0 }
}

impl AudioSample for i16 {
    #[inline(always)] fn max_pos_amplitude() -> Self { i16::MAX }
    #[inline(always)] fn max_neg_amplitude() -> Self { i16::MIN + 1 }
}

impl AudioSample for i8 {
    #[inline(always)] fn max_pos_amplitude() -> Self { i8::MAX }
    #[inline(always)] fn max_neg_amplitude() -> Self { i8::MIN + 1 }
}

// unsigned samples center on the half-range
impl AudioSample for u16 {
    #[inline(always)] fn silence() -> Self { 0x8000 }
    #[inline(always)] fn max_pos_amplitude() -> Self { u16::MAX }
    #[inline(always)] fn max_neg_amplitude() -> Self { 0 }
}

impl AudioSample for u8 {
    #[inline(always)] fn silence() -> Self { 0x80 }
    #[inline(always)] fn max_pos_amplitude() -> Self { u8::MAX }
    #[inline(always)] fn max_neg_amplitude() -> Self { 0 }
}

/// The render-context consumer of a [PulseRing].
///
/// Exactly one renderer may consume a given ring; the deck hands out at
/// most one.
pub struct PulseRenderer<T> {
    ring: Arc<PulseRing>,
    last: T,
}

impl<T: AudioSample> PulseRenderer<T> {
    pub fn new(ring: Arc<PulseRing>) -> Self {
        PulseRenderer { ring, last: T::silence() }
    }

    #[inline]
    fn amplitude(level: bool) -> T {
        if level { T::max_pos_amplitude() } else { T::max_neg_amplitude() }
    }

    /// Fills a mono buffer with the next samples of the pulse train.
    pub fn fill_buffer(&mut self, buf: &mut [T]) {
        self.fill_frames(buf, 1)
    }

    /// Fills an interleaved buffer, duplicating each pulse sample across
    /// `channels`.
    pub fn fill_frames(&mut self, buf: &mut [T], channels: usize) {
        let channels = channels.max(1);
        if !self.ring.is_ready() {
            // the consumer owns the discard of runs left over from a
            // stopped playback; the producer never touches head
            self.ring.consumer_clear();
            self.last = T::silence();
            for sample in buf.iter_mut() {
                *sample = T::silence();
            }
            return;
        }
        let mut missed = 0usize;
        for frame in buf.chunks_mut(channels) {
            match self.ring.take_sample() {
                Some(level) => self.last = Self::amplitude(level),
                None => missed += 1,
            }
            for sample in frame.iter_mut() {
                *sample = self.last;
            }
        }
        if missed > 0 {
            self.ring.note_underrun();
            debug!("render underrun: {} frames held flat", missed);
        }
    }
}
