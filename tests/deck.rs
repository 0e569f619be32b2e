/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! End-to-end deck tests: a scripted block decoder wired to the deck's
//! storage slot, driven through the public control surface.
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use zxtape_deck::{
    BlockDecoder, PinLevel, SectionFlags, SharedStorage, TapeDeck, TapeDeckConfig,
    TapeKind, PERIOD_EOF,
};

// the deck is a process-wide singleton, tests take turns
static DECK_LOCK: Mutex<()> = Mutex::new(());

fn deck_turn() -> MutexGuard<'static, ()> {
    DECK_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Emits one 100 us pulse per container byte, toggling the pin each time.
struct ByteDecoder {
    storage: SharedStorage,
    remaining: u64,
}

impl ByteDecoder {
    fn boxed(storage: SharedStorage) -> Box<dyn BlockDecoder> {
        Box::new(ByteDecoder { storage, remaining: 0 })
    }
}

impl BlockDecoder for ByteDecoder {
    fn start(&mut self) {
        let mut storage = self.storage.lock().unwrap();
        storage.close();
        self.remaining = storage.open().unwrap_or(0);
    }

    fn stop(&mut self) {
        self.remaining = 0;
    }

    fn set_paused(&mut self, _paused: bool) {}

    fn service(&mut self) {}

    fn next_pulse(&mut self, pin: &PinLevel) -> u32 {
        if self.remaining == 0 {
            return PERIOD_EOF;
        }
        self.remaining -= 1;
        pin.toggle();
        100
    }

    fn current_block(&self) -> Option<u32> {
        Some(0)
    }
}

fn fast_config() -> TapeDeckConfig {
    TapeDeckConfig {
        sample_rate: 1_000_000,
        ring_capacity: 32,
        control_interval: Duration::from_millis(0),
        drain_delay: Duration::from_secs(60),
        ..TapeDeckConfig::default()
    }
}

fn make_deck(config: TapeDeckConfig) -> TapeDeck {
    TapeDeck::create(config, ByteDecoder::boxed)
}

/// A minimal FormatA container: header plus one standard-speed block of
/// declared length 4 carrying `[0x00, 0x00, 0xAA, 0xBB]`.
fn tiny_tzx() -> Vec<u8> {
    let mut bytes = b"ZXTape!".to_vec();
    bytes.extend_from_slice(&[0x1A, 1, 20]);
    bytes.push(0x10);
    bytes.extend_from_slice(&1000u16.to_le_bytes());
    bytes.extend_from_slice(&4u16.to_le_bytes());
    bytes.extend_from_slice(&[0x00, 0x00, 0xAA, 0xBB]);
    bytes
}

#[test]
fn end_to_end_tiny_container_analysis() {
    let _turn = deck_turn();
    let mut deck = make_deck(fast_config());
    let bytes = tiny_tzx();
    let total = bytes.len() as u64;
    deck.load_buffer("tiny.tzx", bytes).unwrap();
    let info = deck.info();
    assert_eq!(TapeKind::Tzx, info.kind);
    assert_eq!(1, info.block_count());
    assert_eq!(1, info.section_count());
    assert_eq!(1, info.sections[0].playable_block_count);
    // declared length is 4, not 19: no program header
    assert!(!info.sections[0].flags.contains(SectionFlags::PROGRAM_HEADER));
    let status = deck.status();
    assert!(status.loaded);
    assert!(status.rewound);
    assert!(!status.playing && !status.paused);
    assert_eq!("tiny.tzx", status.filename);
    assert_eq!(1, status.track_count);
    assert_eq!(total, status.length);
}

#[test]
fn play_pause_stop_transitions() {
    let _turn = deck_turn();
    let mut deck = make_deck(fast_config());
    deck.load_buffer("tiny.tzx", tiny_tzx()).unwrap();

    // Stopped → Playing
    deck.play_pause();
    deck.run();
    assert!(deck.status().playing);
    assert!(!deck.status().rewound);

    // Playing → Paused
    deck.play_pause();
    deck.run();
    let status = deck.status();
    assert!(status.paused && !status.playing);

    // Paused → Playing
    deck.play_pause();
    deck.run();
    assert!(deck.status().playing);

    // stop rewinds, twice is the same as once
    deck.stop();
    deck.run();
    let after_one = deck.status();
    assert!(!after_one.playing && !after_one.paused);
    assert!(after_one.rewound);
    deck.stop();
    deck.run();
    let after_two = deck.status();
    assert!(!after_two.playing && !after_two.paused);
    assert!(after_two.rewound);
}

#[test]
fn play_press_overrides_a_pending_stop() {
    let _turn = deck_turn();
    let mut deck = make_deck(fast_config());
    deck.load_buffer("tiny.tzx", tiny_tzx()).unwrap();
    // both buttons land within one control interval: play wins
    deck.stop();
    deck.play_pause();
    deck.run();
    assert!(deck.status().playing);
    // the stale stop press must not fire on the next tick either
    deck.run();
    assert!(deck.status().playing);
    deck.stop();
    deck.run();
    assert!(deck.status().rewound);
}

#[test]
fn play_pause_without_a_tape_is_a_no_op() {
    let _turn = deck_turn();
    let mut deck = make_deck(fast_config());
    deck.play_pause();
    deck.run();
    let status = deck.status();
    assert!(!status.loaded && !status.playing && !status.paused);
    assert!(!status.rewound); // nothing to rewind
}

#[test]
fn playback_renders_pulses_and_drains_to_a_stop() {
    let _turn = deck_turn();
    let mut config = fast_config();
    config.drain_delay = Duration::from_secs(1);
    let mut deck = make_deck(config);
    let mut renderer = deck.renderer::<f32>();
    let bytes = tiny_tzx();
    let pulse_count = bytes.len(); // one 100-sample pulse per byte
    deck.load_buffer("tiny.tzx", bytes).unwrap();

    deck.play_pause();
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut samples = Vec::new();
    let mut buf = [0.0f32; 128];
    loop {
        deck.run();
        renderer.fill_buffer(&mut buf);
        samples.extend_from_slice(&buf);
        if !deck.status().playing && !deck.status().paused {
            break;
        }
        assert!(Instant::now() < deadline, "playback never finished");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(deck.status().rewound);

    // the emitted pulse train: silence while priming, then the pulses as
    // strictly alternating levels starting high, each at least one full
    // run long (underruns only ever extend a run, flat)
    let mut groups: Vec<(f32, usize)> = Vec::new();
    for &sample in samples.iter().filter(|&&s| s != 0.0) {
        match groups.last_mut() {
            Some((level, count)) if *level == sample => *count += 1,
            _ => groups.push((sample, 1)),
        }
    }
    assert_eq!(pulse_count, groups.len());
    for (i, &(level, count)) in groups.iter().enumerate() {
        let expected = if i % 2 == 0 { 1.0 } else { -1.0 };
        assert_eq!(expected, level, "group {}", i);
        assert!(count >= 100, "group {} ran only {} samples", i, count);
    }
}

#[test]
fn pause_at_start_waits_for_a_second_press() {
    let _turn = deck_turn();
    let mut config = fast_config();
    config.pause_at_start = true;
    let mut deck = make_deck(config);
    deck.load_buffer("tiny.tzx", tiny_tzx()).unwrap();
    deck.play_pause();
    deck.run();
    let status = deck.status();
    assert!(status.paused && !status.playing);
    deck.play_pause();
    deck.run();
    assert!(deck.status().playing);
    deck.stop();
    deck.run();
}

/// Never asked for pulses, ends playback from its service step instead.
struct SelfEndingDecoder {
    services: u32,
}

impl BlockDecoder for SelfEndingDecoder {
    fn start(&mut self) {
        self.services = 0;
    }

    fn stop(&mut self) {}

    fn set_paused(&mut self, _paused: bool) {}

    fn service(&mut self) {
        self.services += 1;
    }

    fn next_pulse(&mut self, pin: &PinLevel) -> u32 {
        pin.toggle();
        100
    }

    fn ended(&self) -> bool {
        self.services >= 3
    }
}

#[test]
fn driver_ending_while_paused_drains_to_a_stop() {
    let _turn = deck_turn();
    let mut config = fast_config();
    config.drain_delay = Duration::from_millis(10);
    config.pause_at_start = true;
    let mut deck = TapeDeck::create(config, |_| Box::new(SelfEndingDecoder { services: 0 }));
    deck.load_buffer("tiny.tzx", tiny_tzx()).unwrap();
    deck.play_pause();
    deck.run();
    assert!(deck.status().paused);
    // no pulses are requested while paused, yet the driver's own end
    // signal must still tear playback down
    let deadline = Instant::now() + Duration::from_secs(10);
    while deck.status().paused {
        deck.run();
        assert!(Instant::now() < deadline, "paused deck never noticed the end");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(deck.status().rewound);
}

#[test]
fn failed_load_leaves_the_previous_tape() {
    let _turn = deck_turn();
    let mut deck = make_deck(fast_config());
    deck.load_buffer("tiny.tzx", tiny_tzx()).unwrap();
    assert!(deck.load_file("/nonexistent/directory/none.tzx").is_err());
    let status = deck.status();
    assert!(status.loaded);
    assert_eq!("tiny.tzx", status.filename);
    assert_eq!(1, status.track_count);
    // empty buffers are rejected up front
    assert!(deck.load_buffer("empty.tap", Vec::new()).is_err());
    assert_eq!("tiny.tzx", deck.status().filename);
}

#[test]
fn unrecognized_container_loads_with_no_tracks() {
    let _turn = deck_turn();
    let mut deck = make_deck(fast_config());
    deck.load_buffer("noise.bin", vec![0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    let status = deck.status();
    assert!(status.loaded);
    assert_eq!(0, status.track_count);
    assert_eq!(TapeKind::Unknown, deck.info().kind);
}

#[test]
fn loading_stops_a_rolling_tape() {
    let _turn = deck_turn();
    let mut deck = make_deck(fast_config());
    deck.load_buffer("tiny.tzx", tiny_tzx()).unwrap();
    deck.play_pause();
    deck.run();
    assert!(deck.status().playing);
    deck.load_buffer("other.tzx", tiny_tzx()).unwrap();
    let status = deck.status();
    assert!(!status.playing && status.rewound);
    assert_eq!("other.tzx", status.filename);
}

#[test]
#[should_panic(expected = "already exists")]
fn a_second_deck_is_a_caller_bug() {
    let _turn = deck_turn();
    let _deck = make_deck(fast_config());
    let _second = make_deck(fast_config());
}
