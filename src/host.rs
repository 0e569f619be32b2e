/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! Native audio output hosts.
//!
//! Enable the `cpal` cargo feature to stream the deck's pulse train
//! through a system audio device.
use core::fmt;
use std::error::Error;

#[cfg(feature = "cpal")]
pub mod cpal;

/// Categories of [AudioHandleError].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioHandleErrorKind {
    /// The audio subsystem host or device is not available.
    AudioSubsystem,
    /// Creating or controlling an audio stream failed.
    AudioStream,
    /// The desired audio parameters cannot be satisfied.
    InvalidArguments,
}

/// The error type returned by the audio host implementations.
#[derive(Debug, Clone)]
pub struct AudioHandleError {
    description: String,
    kind: AudioHandleErrorKind,
}

impl fmt::Display for AudioHandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.description.fmt(f)
    }
}

impl Error for AudioHandleError {}

impl AudioHandleError {
    /// The category of this error.
    pub fn kind(&self) -> AudioHandleErrorKind {
        self.kind
    }
}

impl From<(String, AudioHandleErrorKind)> for AudioHandleError {
    fn from((description, kind): (String, AudioHandleErrorKind)) -> Self {
        AudioHandleError { description, kind }
    }
}
