/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! The decode-context pulse producer.
//!
//! A [PulseProducer] owns the decode side of the pipeline: a dedicated
//! thread sleeping on a [OneShot] timer. Every firing it takes the decode
//! mutex, asks the [BlockDecoder](crate::decoder::BlockDecoder) for the
//! next pulse, converts the period to a run of output samples, pushes the
//! run into the [PulseRing] and re-arms the timer with the delay the
//! [AdaptivePacer] chose. The EOF sentinel ends the thread and raises the
//! end-of-tape flag the controller polls.
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::carousel::{PulseRing, PulseRun};
use crate::decoder::{PinLevel, SharedDecoder, PERIOD_EOF};
use crate::pacer::{AdaptivePacer, PacerConfig};
use crate::timer::OneShot;

/// Converts a pulse period to a rounded run length at the output rate.
pub(crate) fn samples_for(period_us: u32, sample_rate: u32) -> u64 {
    let samples = (u64::from(period_us) * u64::from(sample_rate) + 500_000) / 1_000_000;
    samples.max(1)
}

/// Everything the decode thread needs; consumed by [PulseProducer::spawn].
pub struct PulseProducer {
    pub decoder: SharedDecoder,
    pub pin: Arc<PinLevel>,
    pub ring: Arc<PulseRing>,
    pub paused: Arc<AtomicBool>,
    pub sample_rate: u32,
    pub pacer: PacerConfig,
}

impl PulseProducer {
    /// Starts the decode thread and fires the first decode step at once.
    pub fn spawn(self) -> io::Result<ProducerHandle> {
        let timer = OneShot::new();
        let end_of_tape = Arc::new(AtomicBool::new(false));
        let worker_timer = timer.clone();
        let worker_eof = Arc::clone(&end_of_tape);
        let thread = thread::Builder::new()
            .name("tape-pulse".into())
            .spawn(move || self.run(worker_timer, worker_eof))?;
        timer.arm(Duration::from_micros(0));
        Ok(ProducerHandle { timer, thread: Some(thread), end_of_tape })
    }

    fn run(self, timer: OneShot, end_of_tape: Arc<AtomicBool>) {
        let mut pacer = AdaptivePacer::new(self.pacer);
        loop {
            if !timer.wait() {
                break;
            }
            let paused = self.paused.load(Ordering::Acquire);
            // the decode critical section: pulse production and the pin
            // write happen under the decoder mutex
            let period_us = if paused {
                0
            } else {
                let mut decoder = self.decoder.lock()
                    .unwrap_or_else(PoisonError::into_inner);
                decoder.next_pulse(&self.pin)
            };
            if period_us == PERIOD_EOF {
                debug!("end of tape reached");
                end_of_tape.store(true, Ordering::Release);
                break;
            }
            if !paused && period_us > 0 {
                let samples = samples_for(period_us, self.sample_rate);
                let run = PulseRun { level: self.pin.get(), samples };
                if !self.ring.try_push(run) {
                    warn!("pulse ring overrun: dropped a {} sample run", samples);
                }
            }
            let pace = pacer.pace(period_us, self.ring.fill_percent(), paused);
            if pace.mark_ready {
                self.ring.set_ready(true);
            }
            timer.arm(Duration::from_nanos(u64::from(pace.delay_us) * 1_000));
        }
    }
}

/// Owns the decode thread. [ProducerHandle::stop] and dropping both
/// cancel the timer and join the thread, synchronously and idempotently.
pub struct ProducerHandle {
    timer: OneShot,
    thread: Option<JoinHandle<()>>,
    end_of_tape: Arc<AtomicBool>,
}

impl ProducerHandle {
    /// Whether the decoder has signalled the EOF sentinel.
    pub fn end_of_tape(&self) -> bool {
        self.end_of_tape.load(Ordering::Acquire)
    }

    /// Cancels the timer and joins the decode thread.
    pub fn stop(&mut self) {
        self.timer.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
