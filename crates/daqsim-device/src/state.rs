use serde::Serialize;

use crate::config::DeviceConfig;

/// Acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Continuous = 0,
    Trigger = 1,
}

/// Whether streaming is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Stopped = 0,
    Running = 1,
}

impl Mode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Continuous),
            1 => Some(Self::Trigger),
            _ => None,
        }
    }
}

impl StreamStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Stopped),
            1 => Some(Self::Running),
            _ => None,
        }
    }
}

/// Runtime settings of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelState {
    pub enabled: bool,
    pub sample_rate: u32,
    pub format: u8,
}

/// Trigger sub-machine: idle, armed, occurred, sending, then rearmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriggerState {
    pub armed: bool,
    pub occurred: bool,
    pub sending: bool,
    /// Time the trigger fired; burst packets are stamped relative to it.
    pub timestamp_ms: u64,
    pub packets_to_send: u32,
    pub packets_sent: u32,
    pub next_trigger_ms: u64,
}

impl TriggerState {
    /// Back to idle, burst aborted.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Mutable device state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub mode: Mode,
    pub stream: StreamStatus,
    pub channels: Vec<ChannelState>,
    pub trigger: TriggerState,
    /// Time of the last data packet; `None` sends on the next tick.
    pub last_data_ms: Option<u64>,
}

impl DeviceState {
    /// Power-on state: continuous, stopped, channels per config.
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            mode: Mode::Continuous,
            stream: StreamStatus::Stopped,
            channels: config
                .channels
                .iter()
                .map(|spec| ChannelState {
                    enabled: spec.enabled,
                    sample_rate: spec.sample_rate,
                    format: spec.format,
                })
                .collect(),
            trigger: TriggerState::default(),
            last_data_ms: None,
        }
    }

    /// Bit `i` set when channel `i` is enabled.
    pub fn channel_mask(&self) -> u16 {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.enabled)
            .fold(0u16, |mask, (i, _)| mask | (1 << i))
    }

    pub fn is_running(&self) -> bool {
        self.stream == StreamStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_on_state() {
        let state = DeviceState::new(&DeviceConfig::default());
        assert_eq!(state.mode, Mode::Continuous);
        assert_eq!(state.stream, StreamStatus::Stopped);
        assert_eq!(state.channel_mask(), 0b11);
        assert!(!state.trigger.armed);
    }

    #[test]
    fn mask_skips_disabled_channels() {
        let mut state = DeviceState::new(&DeviceConfig::default());
        state.channels[0].enabled = false;
        assert_eq!(state.channel_mask(), 0b10);
    }

    #[test]
    fn wire_values() {
        assert_eq!(Mode::Trigger.as_u8(), 1);
        assert_eq!(StreamStatus::from_u8(1), Some(StreamStatus::Running));
        assert_eq!(Mode::from_u8(9), None);
    }
}
