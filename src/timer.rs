/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! A cancel-and-rearm one-shot timer.
//!
//! The decode loop sleeps on a [OneShot] between pulses; the period is
//! supplied per-pulse by the block decoder, so the timer must support
//! re-arming with a fresh deadline every firing and synchronous
//! cancellation from another thread. It is a condition variable under a
//! mutex, nothing more: on targets with a hardware timer the same shape
//! maps onto an interrupt.
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Armed(Instant),
    Cancelled,
}

struct Inner {
    state: Mutex<State>,
    cond: Condvar,
}

/// A cloneable handle to the timer; typically one clone sleeps in the
/// decode thread while another arms or cancels it.
#[derive(Clone)]
pub struct OneShot {
    inner: Arc<Inner>,
}

impl Default for OneShot {
    fn default() -> Self {
        OneShot::new()
    }
}

impl OneShot {
    pub fn new() -> Self {
        OneShot {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Idle),
                cond: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a poisoned timer state is still a plain enum, keep going
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the timer to fire after `delay`, replacing any pending
    /// deadline. A cancelled timer stays cancelled.
    pub fn arm(&self, delay: Duration) {
        let mut state = self.lock();
        if *state != State::Cancelled {
            *state = State::Armed(Instant::now() + delay);
            self.inner.cond.notify_all();
        }
    }

    /// Cancels the timer, waking any waiter. Idempotent.
    pub fn cancel(&self) {
        *self.lock() = State::Cancelled;
        self.inner.cond.notify_all();
    }

    /// Returns a cancelled timer to [State::Idle] so it can be re-armed.
    pub fn rearm_after_cancel(&self) {
        let mut state = self.lock();
        if *state == State::Cancelled {
            *state = State::Idle;
        }
    }

    /// Blocks until the armed deadline expires (`true`) or the timer is
    /// cancelled (`false`). An idle timer waits for either.
    pub fn wait(&self) -> bool {
        let mut state = self.lock();
        loop {
            match *state {
                State::Cancelled => return false,
                State::Idle => {
                    state = self.inner.cond.wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                State::Armed(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        *state = State::Idle;
                        return true;
                    }
                    state = self.inner.cond.wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner).0;
                }
            }
        }
    }
}
