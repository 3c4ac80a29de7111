use std::path::Path;
use std::time::Duration;

use daqsim_frame::{
    DEFAULT_RX_CAPACITY, DEFAULT_TX_CAPACITY, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

/// Maximum number of channels a device can expose.
pub const MAX_CHANNELS: usize = 8;

/// Default device identifier reported in Pong.
pub const DEFAULT_DEVICE_ID: u64 = 0x1122_3344_AABB_CCDD;

/// Data packet header: timestamp (4) + channel mask (2) + samples per channel (2).
pub const DATA_HEADER_LEN: usize = 8;

/// Sample format bit: signed 16-bit.
pub const FORMAT_INT16: u8 = 0x01;
/// Sample format bit: signed 32-bit.
pub const FORMAT_INT32: u8 = 0x02;

/// Half-open millisecond range `[min, max)` a delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        rng.gen_range(self.min_ms..self.max_ms)
    }
}

/// Static description and power-on settings of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSpec {
    pub name: String,
    /// Advertised in device info.
    pub max_sample_rate: u32,
    /// Bitmask of supported formats.
    pub formats: u16,
    pub sample_rate: u32,
    pub format: u8,
    pub enabled: bool,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for ChannelSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_sample_rate: 100_000,
            formats: u16::from(FORMAT_INT16 | FORMAT_INT32),
            sample_rate: 10_000,
            format: FORMAT_INT16,
            enabled: true,
        }
    }
}

/// Shape of the synthetic waveform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub amplitude: f64,
    pub frequency_hz: f64,
    /// Uniform jitter is drawn from `[-noise, noise)`.
    pub noise: i16,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            amplitude: 1000.0,
            frequency_hz: 50.0,
            noise: 50,
        }
    }
}

/// Device identity, channel table and timing.
///
/// Every field has a default, so a JSON file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub device_id: u64,
    pub protocol_version: u8,
    pub firmware_version: u16,
    pub channels: Vec<ChannelSpec>,
    pub samples_per_packet: u16,
    pub data_interval_ms: u64,
    /// Delay between arming and the first trigger.
    pub trigger_delay: DelayRange,
    /// Delay between the end of a burst and the next trigger.
    pub trigger_rearm: DelayRange,
    /// Inclusive bounds on data packets per burst.
    pub burst_packets_min: u32,
    pub burst_packets_max: u32,
    pub pre_trigger_samples: u32,
    pub post_trigger_samples: u32,
    pub signal: SignalConfig,
    /// Fixed RNG seed for reproducible runs; entropy-seeded when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            protocol_version: 6,
            firmware_version: 0x0201,
            channels: vec![ChannelSpec::new("Voltage"), ChannelSpec::new("Current")],
            samples_per_packet: 100,
            data_interval_ms: 10,
            trigger_delay: DelayRange::new(5_000, 10_000),
            trigger_rearm: DelayRange::new(10_000, 15_000),
            burst_packets_min: 5,
            burst_packets_max: 10,
            pre_trigger_samples: 1000,
            post_trigger_samples: 1000,
            signal: SignalConfig::default(),
            seed: None,
        }
    }
}

impl DeviceConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Size of a data packet payload with every channel enabled.
    pub fn max_data_payload(&self) -> usize {
        DATA_HEADER_LEN + self.channels.len() * usize::from(self.samples_per_packet) * 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() || self.channels.len() > MAX_CHANNELS {
            return Err(DeviceError::Config(format!(
                "channel count must be 1..={MAX_CHANNELS}, got {}",
                self.channels.len()
            )));
        }
        if let Some(ch) = self.channels.iter().find(|ch| ch.name.len() > u8::MAX as usize) {
            return Err(DeviceError::Config(format!(
                "channel name longer than 255 bytes: {:?}",
                ch.name
            )));
        }
        if self.data_interval_ms == 0 {
            return Err(DeviceError::Config("data_interval_ms must be > 0".into()));
        }
        if self.samples_per_packet == 0 {
            return Err(DeviceError::Config("samples_per_packet must be > 0".into()));
        }
        if self.max_data_payload() > MAX_PAYLOAD_SIZE {
            return Err(DeviceError::Config(format!(
                "data packet of {} bytes exceeds frame limit of {MAX_PAYLOAD_SIZE}",
                self.max_data_payload()
            )));
        }
        for (name, range) in [
            ("trigger_delay", self.trigger_delay),
            ("trigger_rearm", self.trigger_rearm),
        ] {
            if range.min_ms >= range.max_ms {
                return Err(DeviceError::Config(format!(
                    "{name} range is empty ({}..{})",
                    range.min_ms, range.max_ms
                )));
            }
        }
        if self.burst_packets_min > self.burst_packets_max {
            return Err(DeviceError::Config(format!(
                "burst packet range is empty ({}..={})",
                self.burst_packets_min, self.burst_packets_max
            )));
        }
        if self.signal.noise < 0 {
            return Err(DeviceError::Config("signal noise must be >= 0".into()));
        }
        Ok(())
    }
}

/// Buffer sizing and pacing of the drive loop.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub rx_capacity: usize,
    pub tx_capacity: usize,
    /// Largest frame the extractor accepts.
    pub max_frame_size: usize,
    /// Bytes requested from the transport per cycle.
    pub recv_chunk: usize,
    /// Sleep after a cycle that moved nothing.
    pub idle_sleep: Duration,
    /// Period of the status log line.
    pub status_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rx_capacity: DEFAULT_RX_CAPACITY,
            tx_capacity: DEFAULT_TX_CAPACITY,
            max_frame_size: MAX_FRAME_SIZE,
            recv_chunk: 4096,
            idle_sleep: Duration::from_millis(1),
            status_interval: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size < MIN_FRAME_SIZE || self.max_frame_size > MAX_FRAME_SIZE {
            return Err(DeviceError::Config(format!(
                "max_frame_size must be {MIN_FRAME_SIZE}..={MAX_FRAME_SIZE}"
            )));
        }
        if self.rx_capacity <= self.max_frame_size {
            return Err(DeviceError::Config(
                "rx_capacity must exceed max_frame_size".into(),
            ));
        }
        if self.tx_capacity <= MAX_FRAME_SIZE + 2 {
            return Err(DeviceError::Config(
                "tx_capacity must hold at least one maximum-size frame".into(),
            ));
        }
        if self.recv_chunk == 0 {
            return Err(DeviceError::Config("recv_chunk must be > 0".into()));
        }
        Ok(())
    }
}
