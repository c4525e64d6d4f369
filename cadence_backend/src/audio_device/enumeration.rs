use cadence_core::{Error, Result, SinkOp};
use cpal::traits::{DeviceTrait, HostTrait};
use std::collections::BTreeSet;
use std::fmt;

use super::host::AudioHost;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub id: cpal::HostId,
    pub name: String,
    pub is_available: bool,
    pub is_default: bool,
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, if self.is_default { "default" } else { "available" })
    }
}

/// Capabilities of one output device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host_id: cpal::HostId,
    pub is_default: bool,

    pub supported_sample_rates: Vec<u32>,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub default_sample_rate: u32,

    pub supported_channels: Vec<u16>,
    pub max_channels: u16,
    pub default_channels: u16,

    pub supported_sample_formats: Vec<cpal::SampleFormat>,
    pub default_sample_format: cpal::SampleFormat,

    /// Callback buffer sizes the device accepts, when it reports them.
    pub buffer_size_range: Option<(u32, u32)>,

    pub(crate) device_index: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}ch @ {}Hz, {:?}{}]",
            self.name,
            self.default_channels,
            self.default_sample_rate,
            self.default_sample_format,
            if self.is_default { ", default" } else { "" }
        )
    }
}

/// Output devices of one audio host.
pub struct DeviceEnumerator {
    host: HostInfo,
    devices: Vec<(cpal::Device, DeviceInfo)>,
}

impl DeviceEnumerator {
    pub fn scan(host: &AudioHost) -> Result<Self> {
        let devices = Self::scan_output_devices(host)?;
        tracing::debug!(host = %host.info(), count = devices.len(), "scanned output devices");
        Ok(Self {
            host: host.info().clone(),
            devices,
        })
    }

    /// Every host compiled into this build, with its availability.
    pub fn enumerate_hosts() -> Vec<HostInfo> {
        let default_host_id = cpal::default_host().id();
        let available = cpal::available_hosts();

        cpal::ALL_HOSTS
            .iter()
            .map(|&id| HostInfo {
                id,
                name: id.name().to_string(),
                is_available: available.contains(&id),
                is_default: id == default_host_id,
            })
            .collect()
    }

    fn scan_output_devices(host: &AudioHost) -> Result<Vec<(cpal::Device, DeviceInfo)>> {
        let host_id = host.info().id;
        let default_name = host
            .host()
            .default_output_device()
            .and_then(|d| d.name().ok());

        let devices = host
            .host()
            .output_devices()
            .map_err(|e| Error::device(SinkOp::Enumerate, e))?;

        let mut found = Vec::new();
        for device in devices {
            let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            let is_default = default_name.as_deref() == Some(device_name.as_str());
            match Self::query_device_info(&device, host_id, is_default, found.len()) {
                Ok(info) => found.push((device, info)),
                Err(err) => tracing::debug!(device = %device_name, error = %err, "skipping device"),
            }
        }

        if found.is_empty() {
            return Err(Error::device(SinkOp::Enumerate, "no output devices found"));
        }
        Ok(found)
    }

    fn query_device_info(
        device: &cpal::Device,
        host_id: cpal::HostId,
        is_default: bool,
        device_index: usize,
    ) -> Result<DeviceInfo> {
        let query = |e: &dyn fmt::Display| Error::device(SinkOp::Enumerate, e);

        let name = device.name().map_err(|e| query(&e))?;
        let default_config = device.default_output_config().map_err(|e| query(&e))?;

        let mut sample_rates = BTreeSet::new();
        let mut min_sample_rate = u32::MAX;
        let mut max_sample_rate = 0u32;
        let mut channels = BTreeSet::new();
        let mut sample_formats = Vec::new();
        let mut buffer_size_range: Option<(u32, u32)> = None;

        for range in device.supported_output_configs().map_err(|e| query(&e))? {
            let min_sr = range.min_sample_rate().0;
            let max_sr = range.max_sample_rate().0;
            min_sample_rate = min_sample_rate.min(min_sr);
            max_sample_rate = max_sample_rate.max(max_sr);

            for &rate in &[8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000, 176400, 192000] {
                if rate >= min_sr && rate <= max_sr {
                    sample_rates.insert(rate);
                }
            }

            channels.insert(range.channels());

            if !sample_formats.contains(&range.sample_format()) {
                sample_formats.push(range.sample_format());
            }

            if let &cpal::SupportedBufferSize::Range { min, max } = range.buffer_size() {
                buffer_size_range = Some(match buffer_size_range {
                    Some((lo, hi)) => (lo.min(min), hi.max(max)),
                    None => (min, max),
                });
            }
        }

        let default_sample_rate = default_config.sample_rate().0;
        if min_sample_rate > max_sample_rate {
            min_sample_rate = default_sample_rate;
            max_sample_rate = default_sample_rate;
        }
        let supported_channels: Vec<u16> = channels.into_iter().collect();

        Ok(DeviceInfo {
            name,
            host_id,
            is_default,
            supported_sample_rates: sample_rates.into_iter().collect(),
            min_sample_rate,
            max_sample_rate,
            default_sample_rate,
            max_channels: supported_channels
                .iter()
                .copied()
                .max()
                .unwrap_or(default_config.channels()),
            supported_channels,
            default_channels: default_config.channels(),
            supported_sample_formats: sample_formats,
            default_sample_format: default_config.sample_format(),
            buffer_size_range,
            device_index,
        })
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    pub fn output_devices(&self) -> Vec<&DeviceInfo> {
        self.devices.iter().map(|(_, info)| info).collect()
    }

    /// The host's default output, or the first device if none is flagged.
    pub fn default_output_device(&self) -> Result<&DeviceInfo> {
        let mut infos = self.devices.iter().map(|(_, info)| info);
        infos
            .clone()
            .find(|info| info.is_default)
            .or_else(|| infos.next())
            .ok_or_else(|| Error::device(SinkOp::Enumerate, "no output devices found"))
    }

    /// Find a device by name (case-insensitive, exact match first, then partial).
    pub fn find_device_by_name(&self, name: &str) -> Result<&DeviceInfo> {
        let name_lower = name.to_lowercase();
        let infos = || self.devices.iter().map(|(_, info)| info);

        infos()
            .find(|info| info.name.to_lowercase() == name_lower)
            .or_else(|| infos().find(|info| info.name.to_lowercase().contains(&name_lower)))
            .ok_or_else(|| Error::device(SinkOp::Enumerate, format!("device not found: {name}")))
    }

    /// Resolve an optional name to a device, falling back to the default output.
    pub fn resolve(&self, name: Option<&str>) -> Result<&DeviceInfo> {
        match name {
            Some(name) => self.find_device_by_name(name),
            None => self.default_output_device(),
        }
    }

    /// The cpal handle behind a `DeviceInfo` from this enumerator.
    pub fn select_device(&self, device_info: &DeviceInfo) -> Result<&cpal::Device> {
        self.devices
            .iter()
            .find(|(_, info)| info.device_index == device_info.device_index)
            .map(|(device, _)| device)
            .ok_or_else(|| {
                Error::device(
                    SinkOp::Enumerate,
                    format!("invalid device index: {}", device_info.device_index),
                )
            })
    }

    pub fn print_device_list(&self) {
        println!("Audio Hosts:");
        for host in Self::enumerate_hosts().iter().filter(|h| h.is_available) {
            println!("  {}", host);
        }
        println!();

        println!("Output Devices ({}):", self.host.name);
        for device in self.output_devices() {
            println!("  [{}] {}", device.device_index, device);
            println!("      Sample rates: {} - {} Hz", device.min_sample_rate, device.max_sample_rate);
            println!("      Channels: {} (max: {})", device.default_channels, device.max_channels);
            println!("      Formats: {:?}", device.supported_sample_formats);
        }
    }
}
