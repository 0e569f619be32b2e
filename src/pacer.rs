/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! Adaptive pacing of the decode timer.
//!
//! After every produced pulse run the decode loop asks the
//! [AdaptivePacer] how long to sleep before requesting the next pulse.
//! The policy is a threshold feedback loop over the queue fill level:
//! prime the queue as fast as possible at first, fill steadily below the
//! equilibrium threshold, and back off above it (or while paused) so the
//! producer never laps the consumer.
use log::trace;

/// The pacing constants.
///
/// These are empirically tuned values from the original platform, not
/// derived ones, which is why they are configuration rather than code.
#[derive(Clone, Copy, Debug)]
pub struct PacerConfig {
    /// Fill percentage at and above which the queue counts as primed.
    pub equilibrium_percent: u32,
    /// Compensates the decode thread's own scheduling overhead; always
    /// added to the requested period.
    pub base_offset_us: u32,
    /// Extra back-off once primed or paused.
    pub relaxed_offset_us: u32,
    /// Delay used while priming the very first fills.
    pub prime_delay_us: u32,
    /// Steady-fill delay below equilibrium once primed.
    pub fill_delay_us: u32,
}

impl Default for PacerConfig {
    fn default() -> Self {
        PacerConfig {
            equilibrium_percent: 25,
            base_offset_us: 3,
            relaxed_offset_us: 250,
            prime_delay_us: 1,
            fill_delay_us: 25,
        }
    }
}

/// The pacer's verdict for one decode step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pace {
    /// How long to wait before the next decode step.
    pub delay_us: u32,
    /// Whether the queue is now eligible for consumption.
    pub mark_ready: bool,
}

/// Threshold feedback over the queue fill level. One instance per
/// playback run; [AdaptivePacer::reset] rewinds it to the priming phase.
#[derive(Debug)]
pub struct AdaptivePacer {
    config: PacerConfig,
    primed: bool,
}

impl AdaptivePacer {
    pub fn new(config: PacerConfig) -> Self {
        AdaptivePacer { config, primed: false }
    }

    pub fn reset(&mut self) {
        self.primed = false;
    }

    /// Decides the next re-arm delay from the period just produced, the
    /// current queue fill percentage and the pause state.
    pub fn pace(&mut self, period_us: u32, fill_percent: u32, paused: bool) -> Pace {
        let cfg = &self.config;
        if paused || fill_percent >= cfg.equilibrium_percent {
            // primed (or idling while paused): back off and let the
            // consumer catch up
            self.primed = true;
            let delay_us = period_us
                .saturating_add(cfg.base_offset_us)
                .saturating_add(cfg.relaxed_offset_us);
            trace!("pace: relaxed {}us at {}%", delay_us, fill_percent);
            return Pace { delay_us, mark_ready: true };
        }
        let delay_us = if self.primed { cfg.fill_delay_us } else { cfg.prime_delay_us };
        trace!("pace: filling {}us at {}%", delay_us, fill_percent);
        Pace { delay_us, mark_ready: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primes_fast_until_equilibrium() {
        let cfg = PacerConfig::default();
        let mut pacer = AdaptivePacer::new(cfg);
        for fill in 0..cfg.equilibrium_percent {
            let pace = pacer.pace(100, fill, false);
            assert_eq!(cfg.prime_delay_us, pace.delay_us);
            assert!(!pace.mark_ready);
        }
    }

    #[test]
    fn crossing_equilibrium_relaxes_and_marks_ready() {
        let cfg = PacerConfig::default();
        let mut pacer = AdaptivePacer::new(cfg);
        let pace = pacer.pace(100, cfg.equilibrium_percent, false);
        assert!(pace.mark_ready);
        assert_eq!(100 + cfg.base_offset_us + cfg.relaxed_offset_us, pace.delay_us);
        // dipping below afterwards fills steadily, never re-primes
        let pace = pacer.pace(100, cfg.equilibrium_percent - 1, false);
        assert_eq!(cfg.fill_delay_us, pace.delay_us);
        assert!(!pace.mark_ready);
    }

    #[test]
    fn paused_relaxes_regardless_of_fill() {
        let cfg = PacerConfig::default();
        let mut pacer = AdaptivePacer::new(cfg);
        let pace = pacer.pace(500, 0, true);
        assert!(pace.mark_ready);
        assert_eq!(500 + cfg.base_offset_us + cfg.relaxed_offset_us, pace.delay_us);
    }

    #[test]
    fn reset_rewinds_to_priming() {
        let cfg = PacerConfig::default();
        let mut pacer = AdaptivePacer::new(cfg);
        pacer.pace(100, cfg.equilibrium_percent, false);
        pacer.reset();
        let pace = pacer.pace(100, 0, false);
        assert_eq!(cfg.prime_delay_us, pace.delay_us);
    }

    #[test]
    fn huge_period_saturates() {
        let mut pacer = AdaptivePacer::new(PacerConfig::default());
        let pace = pacer.pace(u32::MAX - 1, 100, false);
        assert_eq!(u32::MAX, pace.delay_us);
    }
}
