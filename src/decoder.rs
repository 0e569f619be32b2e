/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! The block-decode driver contract.
//!
//! A [BlockDecoder] turns tape container bytes into a timed pulse train.
//! The deck never looks inside it: on every decode step it asks for the
//! next pulse and receives the period, in microseconds, until the one
//! after it, or [PERIOD_EOF] at the end of the tape. The decoder reads
//! its bytes through a [TapeStorage](crate::storage::TapeStorage) backend
//! it was given at construction; [BlockDecoder::service] lets it refill
//! internal buffers outside the timer context.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// The reserved sentinel period signalling end of tape.
pub const PERIOD_EOF: u32 = u32::MAX;

/// The emulated tape output pin.
///
/// Written by the decoder inside the decode critical section, read by the
/// producer when recording the pulse run.
#[derive(Debug, Default)]
pub struct PinLevel(AtomicBool);

impl PinLevel {
    pub fn new() -> Self {
        PinLevel(AtomicBool::new(false))
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_high(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn set_low(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[inline]
    pub fn toggle(&self) {
        self.0.fetch_xor(true, Ordering::AcqRel);
    }
}

/// The driver producing pulses from tape blocks.
///
/// All methods are called with the decode mutex held, never from the
/// render context.
pub trait BlockDecoder: Send {
    /// Begins decoding from the start of the tape.
    fn start(&mut self);
    /// Ends decoding. Must be idempotent.
    fn stop(&mut self);
    fn set_paused(&mut self, paused: bool);
    /// Consumes container bytes and refills internal buffers; called on
    /// the controller's cadence, outside the timer context.
    fn service(&mut self);
    /// Produces the next pulse: drives `pin` to its new level and returns
    /// the period in microseconds until the following pulse, or
    /// [PERIOD_EOF] once the tape is exhausted.
    fn next_pulse(&mut self, pin: &PinLevel) -> u32;
    /// Whether the driver ended playback on its own, outside
    /// [BlockDecoder::next_pulse]. Polled by the controller, which also
    /// honors it while paused, when no pulses are being requested.
    fn ended(&self) -> bool {
        false
    }
    /// The index of the block currently being decoded, when known.
    fn current_block(&self) -> Option<u32> {
        None
    }
}

/// The decode critical section: the decoder is mutated only under this
/// mutex, shared by the producer thread and the controller.
pub type SharedDecoder = Arc<Mutex<Box<dyn BlockDecoder>>>;

pub fn share(decoder: Box<dyn BlockDecoder>) -> SharedDecoder {
    Arc::new(Mutex::new(decoder))
}
