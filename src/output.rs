//! CPAL audio output driving a [`Player`].

use crate::{Error, Player, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, warn};

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. The stream is never
/// touched after creation; it only lives until [`AudioOutput`] is dropped.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: the stream is created, held and dropped by its owning
// `AudioOutput` and never accessed concurrently.
unsafe impl Send for StreamHandle {}

/// A running output stream. Dropping it stops playback.
pub struct AudioOutput {
    sample_rate: u32,
    channels: usize,
    device_name: String,
    _stream: StreamHandle,
}

impl AudioOutput {
    /// Sample rate the device prefers. Build the player with it.
    pub fn device_sample_rate(device_index: Option<usize>) -> Result<u32> {
        let device = get_device(device_index)?;
        Ok(device.default_output_config()?.sample_rate().0)
    }

    /// Move `player` into the audio callback and start the stream.
    pub fn start(player: Player, device_index: Option<usize>) -> Result<Self> {
        let device = get_device(device_index)?;
        let device_name = device.name()?;
        let supported = device.default_output_config()?;
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(player.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, player)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, player)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, player)?,
            format => {
                return Err(Error::InvalidConfig(format!(
                    "Unsupported sample format: {:?}",
                    format
                )));
            }
        };
        stream.play()?;
        debug!(
            "Audio output started on '{}': {} Hz, {} channels",
            device_name, config.sample_rate.0, config.channels
        );

        Ok(Self {
            sample_rate: config.sample_rate.0,
            channels: usize::from(config.channels),
            device_name,
            _stream: StreamHandle(stream),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        host.output_devices()?
            .enumerate()
            .map(|(idx, device)| -> Result<String> { Ok(format!("{}: {}", idx, device.name()?)) })
            .collect()
    }
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(idx) = index {
        let devices: Vec<_> = host.output_devices()?.collect();
        let device_count = devices.len();
        devices.into_iter().nth(idx).ok_or_else(|| {
            Error::InvalidDevice(format!(
                "Output device index {} out of range (available: {})",
                idx, device_count
            ))
        })
    } else {
        host.default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".to_string()))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut player: Player,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = usize::from(config.channels).max(1);
    // preallocated; larger callbacks are rendered through it in slices
    let mut interleaved: Vec<f32> = vec![0.0; 4096 * channels];
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                for out in data.chunks_mut(interleaved.len()) {
                    let buffer = &mut interleaved[..out.len()];
                    player.render_interleaved(buffer, channels);
                    for (dst, sample) in out.iter_mut().zip(buffer.iter()) {
                        *dst = T::from_sample(*sample);
                    }
                }
            }));
            if result.is_err() {
                // panic in callback: silence for this buffer
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
            }
        },
        |err| {
            warn!("Audio stream error: {}", err);
        },
        None,
    )?;
    Ok(stream)
}
