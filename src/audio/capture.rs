use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::slot::{BlockAssembler, BlockSender};
use super::{AudioError, AudioSource};
use crate::config::AudioSettings;

/// One entry of `--list-devices`
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub default_config: Option<String>,
    pub is_default: bool,
}

pub fn list_input_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::Enumerate(e.to_string()))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let default_config = device.default_input_config().ok().map(|c| {
                format!(
                    "{} ch @ {}Hz, {:?}",
                    c.channels(),
                    c.sample_rate().0,
                    c.sample_format()
                )
            });
            DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                default_config,
            }
        })
        .collect())
}

/// Resolve a device by listing index, then by case-insensitive name
/// substring. `None` picks the host default.
fn select_device(host: &cpal::Host, selector: Option<&str>) -> Result<cpal::Device, AudioError> {
    let Some(selector) = selector else {
        return host.default_input_device().ok_or(AudioError::NoDevice);
    };

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::Enumerate(e.to_string()))?
        .collect();

    if let Ok(index) = selector.trim().parse::<usize>() {
        return devices
            .into_iter()
            .nth(index)
            .ok_or_else(|| AudioError::DeviceNotFound(selector.to_string()));
    }

    let needle = selector.to_lowercase();
    devices
        .into_iter()
        .find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| AudioError::DeviceNotFound(selector.to_string()))
}

/// Live capture from a cpal input device
pub struct CaptureSource {
    stream: Option<cpal::Stream>,
    device_name: String,
    sample_rate: u32,
}

impl CaptureSource {
    /// Open the device and start streaming blocks through `sender`.
    /// Any failure here is fatal for the show.
    pub fn open(settings: &AudioSettings, sender: BlockSender) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = select_device(&host, settings.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let sample_format = device
            .default_input_config()
            .map(|c| c.sample_format())
            .map_err(|e| AudioError::StreamBuild {
                device: device_name.clone(),
                reason: e.to_string(),
            })?;

        let config = cpal::StreamConfig {
            channels: settings.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: buffer_size_for(&device, settings),
        };

        let stream = build_stream(&device, &config, sample_format, settings, sender)?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        log::info!(
            "Audio capture: {} @ {}Hz, {} ch, {} frames/block ({:?}, {:?})",
            device_name,
            settings.sample_rate,
            settings.channels,
            settings.block_size,
            sample_format,
            config.buffer_size
        );

        Ok(Self {
            stream: Some(stream),
            device_name,
            sample_rate: settings.sample_rate,
        })
    }
}

/// Ask for callbacks of exactly one block when the device advertises that
/// size; otherwise take its default and let the assembler regroup.
fn buffer_size_for(device: &cpal::Device, settings: &AudioSettings) -> cpal::BufferSize {
    let wanted = settings.block_size as u32;
    let fits = device
        .supported_input_configs()
        .map(|mut ranges| {
            ranges.any(|r| {
                r.channels() == settings.channels
                    && r.min_sample_rate().0 <= settings.sample_rate
                    && settings.sample_rate <= r.max_sample_rate().0
                    && matches!(
                        r.buffer_size(),
                        cpal::SupportedBufferSize::Range { min, max } if *min <= wanted && wanted <= *max
                    )
            })
        })
        .unwrap_or(false);

    if fits {
        cpal::BufferSize::Fixed(wanted)
    } else {
        log::debug!("Device does not advertise {}-frame buffers, using its default", wanted);
        cpal::BufferSize::Default
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    settings: &AudioSettings,
    mut sender: BlockSender,
) -> Result<cpal::Stream, AudioError> {
    let mut assembler = BlockAssembler::new(settings.channels as usize, settings.block_size);
    let err_fn = |err| log::warn!("Input stream error: {}", err);

    let result = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                assembler.push_interleaved(data, |block| {
                    sender.publish(block);
                });
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => {
            let mut converted: Vec<f32> = Vec::with_capacity(settings.block_size * 2);
            device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    converted.clear();
                    converted.extend(data.iter().map(|&s| s as f32 / 32768.0));
                    assembler.push_interleaved(&converted, |block| {
                        sender.publish(block);
                    });
                },
                err_fn,
                None,
            )
        }
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };

    result.map_err(|e| AudioError::StreamBuild {
        device: device.name().unwrap_or_default(),
        reason: e.to_string(),
    })
}

impl AudioSource for CaptureSource {
    fn describe(&self) -> String {
        format!("{} @ {}Hz", self.device_name, self.sample_rate)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause input stream: {}", e);
            }
            drop(stream);
            log::info!("Audio capture stopped");
        }
        Ok(())
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
