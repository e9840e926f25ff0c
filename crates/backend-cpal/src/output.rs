// cpal output stream

use crate::engine::Shared;
use crate::ring::SharedRing;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfig,
};
use soundroom_core::{AudioError, Result};
use std::sync::Arc;

/// Default output device and its preferred configuration
pub(crate) fn open_device() -> Result<(Device, SupportedStreamConfig)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceError("No output device available".to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceError(format!("Failed to get output config: {}", e)))?;

    log::info!(
        "Output device {}: {} Hz, {} channels, {:?}",
        device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
        config.sample_rate().0,
        config.channels(),
        config.sample_format()
    );
    Ok((device, config))
}

/// Build and start a stream pulling from `ring`. It plays silence until
/// `shared` says playing, and for good once engine `run` is superseded.
pub(crate) fn start_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    ring: SharedRing,
    shared: Arc<Shared>,
    run: u64,
) -> Result<Stream> {
    let config = supported.config();
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(device, &config, ring, shared, run)?,
        SampleFormat::I16 => build_stream::<i16>(device, &config, ring, shared, run)?,
        SampleFormat::U16 => build_stream::<u16>(device, &config, ring, shared, run)?,
        format => {
            return Err(AudioError::UnsupportedFormat(format!(
                "Unsupported output sample format: {:?}",
                format
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::DeviceError(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    ring: SharedRing,
    shared: Arc<Shared>,
    run: u64,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let sample_rate = config.sample_rate.0;
    let mut scratch: Vec<f32> = Vec::new();
    let mut underflows: u64 = 0;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let silence = T::from_sample(0.0f32);
                if !shared.is_current(run) || !shared.is_playing() || shared.is_seeking() {
                    data.fill(silence);
                    return;
                }

                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let read = ring.read(&mut scratch[..data.len()]);
                let gain = shared.gain();

                for (i, out) in data.iter_mut().enumerate() {
                    *out = if i < read {
                        T::from_sample((scratch[i] * gain).clamp(-1.0, 1.0))
                    } else {
                        silence
                    };
                }

                shared.advance_clock(read / channels, sample_rate);

                if read < data.len() && !shared.is_draining() {
                    underflows += 1;
                    if underflows % 50 == 1 {
                        log::warn!("Audio underflow count={}", underflows);
                    }
                }
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::DeviceError(format!("Failed to build output stream: {}", e)))
}
