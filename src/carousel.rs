/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
/*! The pulse carousel: a bounded lock-free queue carrying run-length
encoded pulses from the decode context to the render context.

[PulseRing] is a single-producer single-consumer ring. The producer is the
decode timer thread calling [PulseRing::try_push]; the consumer is the
audio callback calling [PulseRing::take_sample]. Neither side ever blocks
or allocates, which is what makes the ring safe to touch from a real-time
audio callback.

One slot is sacrificed to distinguish full from empty, so a ring created
with capacity `N` holds at most `N - 1` runs.
*/
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// A run of identical output samples: `samples` ticks of the output clock
/// with the pin held at `level`.
///
/// Invariant: `samples >= 1`. Zero-length runs are never enqueued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PulseRun {
    pub level: bool,
    pub samples: u64,
}

/// A fixed-capacity SPSC ring of [PulseRun]s.
///
/// Safety contract: at most one thread pushes and at most one thread
/// consumes at any given time. [PulseRing::reset] requires both sides
/// quiescent. The slot at `head` belongs to the consumer once published,
/// which is what allows [PulseRing::take_sample] to decrement it in place.
pub struct PulseRing {
    slots: Box<[UnsafeCell<PulseRun>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    /// Set by the pacer once enough runs are buffered for rendering to
    /// begin; cleared on reset. The renderer emits silence until then.
    ready: AtomicBool,
    overruns: AtomicU32,
    underruns: AtomicU32,
}

// Slots are plain Copy data guarded by the head/tail publication protocol.
unsafe impl Sync for PulseRing {}

impl PulseRing {
    /// Creates a ring with room for `capacity - 1` runs.
    ///
    /// `capacity` must be a power of two and at least 2.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two() && capacity >= 2,
                "ring capacity must be a power of two >= 2");
        let slots = (0..capacity).map(|_| UnsafeCell::new(PulseRun::default()))
                                 .collect::<Vec<_>>()
                                 .into_boxed_slice();
        PulseRing {
            slots,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
        }
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Enqueues a run without blocking. Returns `false` and counts an
    /// overrun when the ring is full; the run is dropped.
    pub fn try_push(&self, run: PulseRun) -> bool {
        debug_assert!(run.samples >= 1);
        let tail = self.tail.load(Ordering::Relaxed);
        let next = (tail + 1) & self.mask();
        if next == self.head.load(Ordering::Acquire) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        unsafe { *self.slots[tail].get() = run; }
        self.tail.store(next, Ordering::Release);
        true
    }

    /// Dequeues a whole run, if any.
    pub fn take_one(&self) -> Option<PulseRun> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        let run = unsafe { *self.slots[head].get() };
        self.head.store((head + 1) & self.mask(), Ordering::Release);
        Some(run)
    }

    /// Takes a single output sample off the head run, decrementing it in
    /// place and advancing only when the run is exhausted. `None` means
    /// the ring is empty (an underrun, if playback is under way).
    pub fn take_sample(&self) -> Option<bool> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        let slot = unsafe { &mut *self.slots[head].get() };
        let level = slot.level;
        if slot.samples > 1 {
            slot.samples -= 1;
        } else {
            self.head.store((head + 1) & self.mask(), Ordering::Release);
        }
        Some(level)
    }

    /// The number of queued runs.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) & self.mask()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue occupancy: `((tail - head) mod N) * 100 / N`. Tops out just
    /// short of 100 because of the sacrificed slot.
    pub fn fill_percent(&self) -> u32 {
        (self.len() * 100 / self.capacity()) as u32
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Empties the ring and clears the ready flag and fault counters.
    ///
    /// Both sides must be quiescent: the producer stopped and no consumer
    /// in existence. With a live consumer, clear the ready flag and leave
    /// the discarding to [PulseRing::consumer_clear].
    pub fn reset(&self) {
        self.head.store(0, Ordering::Release);
        self.tail.store(0, Ordering::Release);
        self.ready.store(false, Ordering::Release);
        self.clear_faults();
    }

    /// Discards every queued run. A consumer-side operation: it only
    /// advances `head`, so the consumer may call it at any time.
    pub fn consumer_clear(&self) {
        self.head.store(self.tail.load(Ordering::Acquire), Ordering::Release);
    }

    /// Zeroes the fault counters. Safe from either side.
    pub fn clear_faults(&self) {
        self.overruns.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
    }

    pub fn note_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn underruns(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn run(level: bool, samples: u64) -> PulseRun {
        PulseRun { level, samples }
    }

    #[test]
    fn push_take_preserves_order() {
        let ring = PulseRing::new(8);
        for k in 1..=5 {
            assert!(ring.try_push(run(k % 2 == 0, k)));
        }
        assert_eq!(5, ring.len());
        for k in 1..=5 {
            assert_eq!(Some(run(k % 2 == 0, k)), ring.take_one());
        }
        assert_eq!(None, ring.take_one());
        assert!(ring.is_empty());
    }

    #[test]
    fn full_ring_drops_and_counts() {
        let ring = PulseRing::new(4);
        // one slot is sacrificed: capacity 4 holds 3 runs
        assert!(ring.try_push(run(true, 1)));
        assert!(ring.try_push(run(false, 1)));
        assert!(ring.try_push(run(true, 1)));
        assert!(!ring.try_push(run(false, 1)));
        assert_eq!(1, ring.overruns());
        assert_eq!(75, ring.fill_percent());
        ring.take_one().unwrap();
        assert!(ring.try_push(run(false, 7)));
        assert_eq!(1, ring.overruns());
    }

    #[test]
    fn take_sample_decrements_in_place() {
        let ring = PulseRing::new(8);
        ring.try_push(run(true, 3));
        ring.try_push(run(false, 1));
        assert_eq!(2, ring.len());
        assert_eq!(Some(true), ring.take_sample());
        assert_eq!(Some(true), ring.take_sample());
        assert_eq!(2, ring.len()); // head run still has one sample left
        assert_eq!(Some(true), ring.take_sample());
        assert_eq!(1, ring.len());
        assert_eq!(Some(false), ring.take_sample());
        assert_eq!(None, ring.take_sample());
    }

    #[test]
    fn reset_clears_everything() {
        let ring = PulseRing::new(8);
        ring.try_push(run(true, 9));
        ring.set_ready(true);
        ring.note_underrun();
        ring.reset();
        assert!(ring.is_empty());
        assert!(!ring.is_ready());
        assert_eq!(0, ring.underruns());
        assert_eq!(None, ring.take_sample());
    }

    #[test]
    fn consumer_clear_discards_queued_runs() {
        let ring = PulseRing::new(8);
        for k in 1..=4 {
            ring.try_push(run(true, k));
        }
        ring.consumer_clear();
        assert!(ring.is_empty());
        assert_eq!(None, ring.take_one());
        // indices stay consistent for the producer
        assert!(ring.try_push(run(false, 9)));
        assert_eq!(Some(run(false, 9)), ring.take_one());
    }

    #[test]
    fn fill_percent_is_len_over_capacity() {
        let ring = PulseRing::new(8);
        assert_eq!(0, ring.fill_percent());
        ring.try_push(run(true, 1));
        ring.try_push(run(false, 1));
        assert_eq!(25, ring.fill_percent());
        for _ in 0..5 {
            ring.try_push(run(true, 1));
        }
        // a full ring holds N - 1 runs
        assert_eq!(87, ring.fill_percent());
    }

    #[test]
    fn wraparound_indices() {
        let ring = PulseRing::new(4);
        for k in 0..100u64 {
            assert!(ring.try_push(run(k % 2 == 0, k + 1)));
            assert_eq!(Some(run(k % 2 == 0, k + 1)), ring.take_one());
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn spsc_threads_round_trip() {
        const COUNT: usize = 10_000;
        let ring = Arc::new(PulseRing::new(64));
        let mut rng = SmallRng::seed_from_u64(42);
        let pushed: Vec<PulseRun> = (0..COUNT)
            .map(|_| run(rng.gen(), rng.gen_range(1..=5)))
            .collect();
        let expected = pushed.clone();
        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for run in pushed {
                    while !ring.try_push(run) {
                        thread::yield_now();
                    }
                }
            })
        };
        let mut received = Vec::with_capacity(COUNT);
        while received.len() < COUNT {
            match ring.take_one() {
                Some(run) => received.push(run),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert_eq!(expected, received);
    }
}
