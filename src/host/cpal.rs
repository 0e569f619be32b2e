/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! Audio output through [cpal](https://crates.io/crates/cpal).
//!
//! The deck's [PulseRenderer] moves into the **cpal** audio thread, where
//! the output data callback fills each requested buffer straight from the
//! pulse ring. Requires the "cpal" feature.
use core::convert::TryInto;

use log::error;

use cpal::{
    Stream,
    PlayStreamError, PauseStreamError, DefaultStreamConfigError, BuildStreamError,
    traits::{DeviceTrait, HostTrait, StreamTrait}
};

pub use cpal::SampleFormat;

use crate::deck::TapeDeck;
use crate::render::{AudioSample, PulseRenderer};
pub use super::{AudioHandleError, AudioHandleErrorKind};

/// An open output stream rendering the deck's pulse train.
///
/// The stream keeps playing for as long as the handle lives; when no tape
/// is rolling the renderer feeds it silence.
pub struct AudioHandle {
    /// The sample frequency of the output stream. Create the deck with
    /// this rate, or the pulse timing will be off.
    pub sample_rate: u32,
    /// The number of interleaved channels in the output stream.
    pub channels: u8,
    stream: Stream,
}

impl AudioHandle {
    /// Starts playback of the audio device.
    pub fn play(&self) -> Result<(), AudioHandleError> {
        self.stream.play().map_err(From::from)
    }

    /// Pauses playback of the audio device.
    pub fn pause(&self) -> Result<(), AudioHandleError> {
        self.stream.pause().map_err(From::from)
    }

    /// Closes the stream and frees the underlying resources.
    pub fn close(self) {}

    /// Opens the default output device of `host` with its default
    /// parameters, taking the deck's renderer.
    pub fn create(host: &cpal::Host, deck: &mut TapeDeck) -> Result<Self, AudioHandleError> {
        let device = host.default_output_device()
                     .ok_or_else(|| ("no default output device".to_string(),
                                     AudioHandleErrorKind::AudioSubsystem))?;
        Self::create_with_device(&device, deck)
    }

    /// Opens `device` with its default parameters, taking the deck's
    /// renderer.
    pub fn create_with_device(device: &cpal::Device, deck: &mut TapeDeck)
        -> Result<Self, AudioHandleError>
    {
        let default_config = device.default_output_config()?;
        let sample_format = default_config.sample_format();
        Self::create_with_device_and_config(device, &default_config.config(),
                                            sample_format, deck)
    }

    /// Opens `device` with the given parameters, dispatching on the
    /// stream's sample format.
    pub fn create_with_device_and_config(
            device: &cpal::Device,
            config: &cpal::StreamConfig,
            sample_format: SampleFormat,
            deck: &mut TapeDeck,
        ) -> Result<Self, AudioHandleError>
    {
        match sample_format {
            SampleFormat::I8  => Self::build::<i8>(device, config, deck.renderer()),
            SampleFormat::I16 => Self::build::<i16>(device, config, deck.renderer()),
            SampleFormat::U8  => Self::build::<u8>(device, config, deck.renderer()),
            SampleFormat::U16 => Self::build::<u16>(device, config, deck.renderer()),
            SampleFormat::F32 => Self::build::<f32>(device, config, deck.renderer()),
            sf => Err((format!("unsupported sample format: {:?}", sf),
                       AudioHandleErrorKind::InvalidArguments).into()),
        }
    }

    fn build<T: cpal::SizedSample + AudioSample>(
            device: &cpal::Device,
            config: &cpal::StreamConfig,
            mut renderer: PulseRenderer<T>,
        ) -> Result<Self, AudioHandleError>
    {
        let channels: u8 = config.channels.try_into()
            .map_err(|_| (format!("number of channels: {} exceeds 255", config.channels),
                          AudioHandleErrorKind::InvalidArguments))?;
        let sample_rate = config.sample_rate.0;
        let frames = channels as usize;
        let data_fn = move |out: &mut [T], _: &cpal::OutputCallbackInfo| {
            renderer.fill_frames(out, frames)
        };
        let err_fn = |err| error!("an error occurred on stream: {}", err);
        let stream = device.build_output_stream(config, data_fn, err_fn, None)?;
        Ok(AudioHandle { sample_rate, channels, stream })
    }
}

/// The sample rate of the host's default output device, for sizing the
/// deck before opening the stream.
pub fn default_sample_rate(host: &cpal::Host) -> Result<u32, AudioHandleError> {
    let device = host.default_output_device()
                 .ok_or_else(|| ("no default output device".to_string(),
                                 AudioHandleErrorKind::AudioSubsystem))?;
    Ok(device.default_output_config()?.sample_rate().0)
}

impl From<PlayStreamError> for AudioHandleError {
    fn from(e: PlayStreamError) -> Self {
        let kind = match e {
            PlayStreamError::DeviceNotAvailable => AudioHandleErrorKind::AudioSubsystem,
            _ => AudioHandleErrorKind::AudioStream
        };
        (e.to_string(), kind).into()
    }
}

impl From<PauseStreamError> for AudioHandleError {
    fn from(e: PauseStreamError) -> Self {
        let kind = match e {
            PauseStreamError::DeviceNotAvailable => AudioHandleErrorKind::AudioSubsystem,
            _ => AudioHandleErrorKind::AudioStream
        };
        (e.to_string(), kind).into()
    }
}

impl From<DefaultStreamConfigError> for AudioHandleError {
    fn from(e: DefaultStreamConfigError) -> Self {
        let kind = match e {
            DefaultStreamConfigError::StreamTypeNotSupported => AudioHandleErrorKind::InvalidArguments,
            _ => AudioHandleErrorKind::AudioSubsystem
        };
        (e.to_string(), kind).into()
    }
}

impl From<BuildStreamError> for AudioHandleError {
    fn from(e: BuildStreamError) -> Self {
        let kind = match e {
            BuildStreamError::DeviceNotAvailable => AudioHandleErrorKind::AudioSubsystem,
            BuildStreamError::StreamConfigNotSupported |
            BuildStreamError::InvalidArgument => AudioHandleErrorKind::InvalidArguments,
            _ => AudioHandleErrorKind::AudioStream
        };
        (e.to_string(), kind).into()
    }
}
