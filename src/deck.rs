/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
/*! The tape deck controller.

[TapeDeck] owns the whole playback pipeline: the shared storage slot, the
block decoder behind its mutex, the pulse ring, the producer thread and
the playback state machine `Stopped → Playing ⇄ Paused` with the
transient drain countdown at end of playback.

The deck is driven by polling: the caller invokes [TapeDeck::run] on its
own cadence (ideally a few times per control interval). Each invocation
performs the always-running playback service step and, once per control
interval, consumes the one-shot button presses, starts or stops the
pipeline and advances the drain countdown. Buttons ([TapeDeck::play_pause],
[TapeDeck::stop]) only set flags, so they are safe to call from signal-ish
contexts like a GUI event handler.

A process holds at most one deck; creating a second while the first is
alive is a caller bug and panics.
*/
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::carousel::PulseRing;
use crate::decoder::{self, BlockDecoder, PinLevel, SharedDecoder};
use crate::info::{analyze, TapeInfo};
use crate::pacer::PacerConfig;
use crate::producer::{ProducerHandle, PulseProducer};
use crate::render::{AudioSample, PulseRenderer};
use crate::storage::{self, BufferStorage, FileStorage, NullStorage, SharedStorage, TapeStorage};

static DECK_LIVE: AtomicBool = AtomicBool::new(false);

/// Deck tuning. The defaults reproduce the original platform's timing.
#[derive(Clone, Copy, Debug)]
pub struct TapeDeckConfig {
    /// Output sample rate the pulse periods are converted at.
    pub sample_rate: u32,
    /// Pulse ring capacity; must be a power of two.
    pub ring_capacity: usize,
    /// The control-loop cadence.
    pub control_interval: Duration,
    /// How long buffered pulses may keep draining after the decoder
    /// signals end of tape.
    pub drain_delay: Duration,
    /// Start playback paused, leaving the first press to release it.
    pub pause_at_start: bool,
    pub pacer: PacerConfig,
}

impl Default for TapeDeckConfig {
    fn default() -> Self {
        TapeDeckConfig {
            sample_rate: 44_100,
            ring_capacity: 2048,
            control_interval: Duration::from_millis(100),
            drain_delay: Duration::from_millis(3000),
            pause_at_start: false,
            pacer: PacerConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeckState {
    Stopped,
    Playing,
    Paused,
}

/// The loaded tape: what was the implicit global file state of the
/// original platform, made explicit.
#[derive(Clone, Debug)]
pub struct TapeSession {
    pub filename: String,
    pub size: u64,
    pub pause_at_start: bool,
}

/// A point-in-time copy of the deck state; never aliases deck internals.
#[derive(Clone, Debug, Default)]
pub struct TapeDeckStatus {
    pub loaded: bool,
    /// Loaded but not running: the tape sits at its beginning.
    pub rewound: bool,
    pub playing: bool,
    pub paused: bool,
    pub filename: String,
    /// Section currently playing.
    pub track: u32,
    /// Block within the current section.
    pub position: u32,
    pub track_count: u32,
    /// Container size in bytes.
    pub length: u64,
}

pub struct TapeDeck {
    config: TapeDeckConfig,
    storage: SharedStorage,
    decoder: SharedDecoder,
    pin: Arc<PinLevel>,
    ring: Arc<PulseRing>,
    paused_flag: Arc<AtomicBool>,
    producer: Option<ProducerHandle>,
    session: Option<TapeSession>,
    info: TapeInfo,
    state: DeckState,
    drain_remaining: Option<Duration>,
    play_pause_pressed: bool,
    stop_pressed: bool,
    last_control: Instant,
    renderer_taken: bool,
}

impl TapeDeck {
    /// Creates the deck and wires the block decoder to the deck's shared
    /// storage slot. The slot starts out holding no tape.
    ///
    /// Panics if another deck is alive in this process.
    pub fn create<F>(config: TapeDeckConfig, make_decoder: F) -> TapeDeck
        where F: FnOnce(SharedStorage) -> Box<dyn BlockDecoder>
    {
        if DECK_LIVE.swap(true, Ordering::AcqRel) {
            panic!("a TapeDeck instance already exists in this process");
        }
        let storage = storage::share(Box::new(NullStorage));
        let decoder = decoder::share(make_decoder(Arc::clone(&storage)));
        TapeDeck {
            ring: Arc::new(PulseRing::new(config.ring_capacity)),
            config,
            storage,
            decoder,
            pin: Arc::new(PinLevel::new()),
            paused_flag: Arc::new(AtomicBool::new(false)),
            producer: None,
            session: None,
            info: TapeInfo::default(),
            state: DeckState::Stopped,
            drain_remaining: None,
            play_pause_pressed: false,
            stop_pressed: false,
            last_control: Instant::now(),
            renderer_taken: false,
        }
    }

    /// Returns the deck to a known idle state: playback stopped, pending
    /// button presses dropped, control clock restarted.
    pub fn init(&mut self) {
        self.stop_playback();
        self.play_pause_pressed = false;
        self.stop_pressed = false;
        self.last_control = Instant::now();
    }

    fn lock_decoder(&self) -> MutexGuard<'_, Box<dyn BlockDecoder>> {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads a tape file, stopping any current playback.
    ///
    /// The file is opened and analyzed first; on failure the previously
    /// loaded tape and the playback state are left untouched.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let filename = path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if filename.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                      "no tape file name given"));
        }
        let mut backend = FileStorage::new(path);
        let info = analyze(&mut backend, &filename)?;
        self.commit_load(Box::new(backend), filename, info);
        Ok(())
    }

    /// Loads a tape already held in memory, stopping any current playback.
    pub fn load_buffer(&mut self, name: &str, data: Vec<u8>) -> io::Result<()> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                      "no tape name given"));
        }
        if data.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                      "empty tape buffer"));
        }
        let mut backend = BufferStorage::new(data);
        let info = analyze(&mut backend, name)?;
        self.commit_load(Box::new(backend), name.to_string(), info);
        Ok(())
    }

    fn commit_load(&mut self, backend: Box<dyn TapeStorage + Send>,
                   filename: String, info: TapeInfo) {
        self.stop_playback();
        let size = backend.size();
        info!("loaded tape: {} ({}, {} bytes, {} tracks)",
              filename, info.kind, size, info.section_count());
        *self.storage.lock().unwrap_or_else(PoisonError::into_inner) = backend;
        self.info = info;
        self.session = Some(TapeSession {
            filename,
            size,
            pause_at_start: self.config.pause_at_start,
        });
    }

    /// Presses the play/pause button. One-shot: consumed by the next
    /// control-loop tick. A no-op when no tape is loaded.
    ///
    /// Overrides a stop press pending from the same control interval.
    pub fn play_pause(&mut self) {
        if self.session.is_some() {
            self.stop_pressed = false;
            self.play_pause_pressed = true;
        }
    }

    /// Presses the stop button. One-shot, like [TapeDeck::play_pause].
    pub fn stop(&mut self) {
        self.stop_pressed = true;
    }

    /// Stopping a tape rewinds it.
    pub fn rewind(&mut self) {
        self.stop();
    }

    /// Drives the deck. Call on a steady cadence; the playback service
    /// step runs every invocation, the control logic once per
    /// [TapeDeckConfig::control_interval].
    pub fn run(&mut self) {
        if self.state != DeckState::Stopped && self.drain_remaining.is_none() {
            self.lock_decoder().service();
        }
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_control);
        if elapsed < self.config.control_interval {
            return;
        }
        self.last_control = now;
        if std::mem::take(&mut self.play_pause_pressed) {
            self.toggle_play_pause();
        }
        if std::mem::take(&mut self.stop_pressed) {
            self.stop_playback();
        }
        // end of playback surfaces either through the producer's EOF
        // sentinel or straight from the driver, which may finish during
        // its service step even while paused
        let ended = self.state != DeckState::Stopped
            && (self.producer.as_ref().map_or(false, ProducerHandle::end_of_tape)
                || self.lock_decoder().ended());
        if ended && self.drain_remaining.is_none() && self.state != DeckState::Stopped {
            debug!("end of playback, draining for {:?}", self.config.drain_delay);
            self.drain_remaining = Some(self.config.drain_delay);
        }
        if let Some(remaining) = self.drain_remaining {
            if remaining <= elapsed {
                self.stop_playback();
            } else {
                self.drain_remaining = Some(remaining - elapsed);
            }
        }
    }

    fn toggle_play_pause(&mut self) {
        match self.state {
            DeckState::Stopped => self.start_playback(),
            DeckState::Playing => {
                self.paused_flag.store(true, Ordering::Release);
                self.lock_decoder().set_paused(true);
                self.state = DeckState::Paused;
                info!("tape paused");
            }
            DeckState::Paused => {
                self.paused_flag.store(false, Ordering::Release);
                self.lock_decoder().set_paused(false);
                self.state = DeckState::Playing;
                info!("tape resumed");
            }
        }
    }

    fn start_playback(&mut self) {
        let (filename, pause_at_start) = match &self.session {
            Some(session) => (session.filename.clone(), session.pause_at_start),
            None => return,
        };
        if self.renderer_taken {
            self.ring.clear_faults();
        } else {
            self.ring.reset();
        }
        self.paused_flag.store(pause_at_start, Ordering::Release);
        {
            let mut decoder = self.lock_decoder();
            decoder.start();
            decoder.set_paused(pause_at_start);
        }
        let producer = PulseProducer {
            decoder: Arc::clone(&self.decoder),
            pin: Arc::clone(&self.pin),
            ring: Arc::clone(&self.ring),
            paused: Arc::clone(&self.paused_flag),
            sample_rate: self.config.sample_rate,
            pacer: self.config.pacer,
        };
        match producer.spawn() {
            Ok(handle) => {
                self.producer = Some(handle);
                self.state = if pause_at_start { DeckState::Paused } else { DeckState::Playing };
                info!("playing tape: {}", filename);
            }
            Err(e) => {
                error!("could not start the decode thread: {}", e);
                self.lock_decoder().stop();
                self.paused_flag.store(false, Ordering::Release);
            }
        }
    }

    /// Synchronous, idempotent teardown: cancels the decode timer, joins
    /// the decode thread, clears the ring's ready flag (which mutes the
    /// renderer) and drops the pin.
    fn stop_playback(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
        if self.state != DeckState::Stopped {
            self.lock_decoder().stop();
            info!("tape stopped");
        }
        // with a renderer attached the render callback owns the head
        // index; it discards leftover runs itself once it observes the
        // cleared ready flag
        self.ring.set_ready(false);
        if !self.renderer_taken {
            self.ring.reset();
        }
        self.paused_flag.store(false, Ordering::Release);
        self.pin.set_low();
        self.state = DeckState::Stopped;
        self.drain_remaining = None;
    }

    /// A snapshot of the deck state.
    pub fn status(&self) -> TapeDeckStatus {
        let loaded = self.session.is_some();
        let running = self.state != DeckState::Stopped;
        let (track, position) = if running {
            self.playing_position()
        } else {
            (0, 0)
        };
        TapeDeckStatus {
            loaded,
            rewound: loaded && !running,
            playing: self.state == DeckState::Playing,
            paused: self.state == DeckState::Paused,
            filename: self.session.as_ref()
                .map(|session| session.filename.clone())
                .unwrap_or_default(),
            track,
            position,
            track_count: self.info.section_count(),
            length: self.info.size,
        }
    }

    /// Maps the decoder's current block onto (section index, block within
    /// the section).
    fn playing_position(&self) -> (u32, u32) {
        let block = match self.lock_decoder().current_block() {
            Some(block) => block,
            None => return (0, 0),
        };
        self.info.sections.iter()
            .find(|s| block >= s.start_block && block < s.start_block + s.block_count)
            .map(|s| (s.index, block - s.start_block))
            .unwrap_or((0, 0))
    }

    /// The analysis of the loaded tape; empty when nothing is loaded.
    pub fn info(&self) -> &TapeInfo {
        &self.info
    }

    /// The storage slot the block decoder reads through.
    pub fn storage(&self) -> SharedStorage {
        Arc::clone(&self.storage)
    }

    /// Hands out the render-context consumer of the deck's pulse ring.
    ///
    /// The ring is single-consumer: asking for a second renderer is a
    /// caller bug and panics.
    pub fn renderer<T: AudioSample>(&mut self) -> PulseRenderer<T> {
        if self.renderer_taken {
            panic!("the deck renderer was already taken");
        }
        self.renderer_taken = true;
        PulseRenderer::new(Arc::clone(&self.ring))
    }
}

impl Drop for TapeDeck {
    fn drop(&mut self) {
        self.stop_playback();
        DECK_LIVE.store(false, Ordering::Release);
    }
}
