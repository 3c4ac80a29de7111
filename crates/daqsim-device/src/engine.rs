use std::f64::consts::PI;

use bytes::BufMut;
use daqsim_frame::{build_frame, command, command_name, parse_frame, TxQueue, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{ProtocolError, Result};
use crate::request::{ChannelConfig, Request};
use crate::response::{ChannelInfo, Response};
use crate::state::{DeviceState, Mode, StreamStatus};

/// Frame counters of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    /// Frames that passed validation and were dispatched.
    pub frames_handled: u64,
    /// Frames dropped for format or checksum errors.
    pub frames_rejected: u64,
    pub frames_queued: u64,
    /// Outgoing frames dropped because the TX queue was full.
    pub frames_dropped: u64,
}

/// Encodes frames into a reusable buffer and queues them.
#[derive(Debug)]
struct Emitter {
    frame_buf: Vec<u8>,
    stats: DeviceStats,
}

impl Emitter {
    fn emit(&mut self, tx: &mut TxQueue, command_id: u8, seq: u8, payload: &[u8]) {
        let len = match build_frame(command_id, seq, payload, &mut self.frame_buf) {
            Ok(len) => len,
            Err(err) => {
                warn!(command = command_name(command_id), error = %err, "failed to build frame");
                return;
            }
        };
        match tx.enqueue(&self.frame_buf[..len]) {
            Ok(()) => {
                self.stats.frames_queued += 1;
                debug!(command = command_name(command_id), seq, len, "tx queued");
            }
            Err(err) => {
                self.stats.frames_dropped += 1;
                warn!(command = command_name(command_id), seq, error = %err, "tx queue full, frame dropped");
            }
        }
    }
}

/// The simulated device: command dispatch and periodic streaming.
///
/// Holds no I/O. Incoming frames are handed to [`handle_frame`](Self::handle_frame),
/// time advances through [`tick`](Self::tick), and every outgoing frame is
/// placed on the caller's [`TxQueue`].
#[derive(Debug)]
pub struct Device {
    config: DeviceConfig,
    state: DeviceState,
    rng: StdRng,
    /// Sequence number for frames the device sends unprompted.
    seq: u8,
    payload_buf: Vec<u8>,
    data_buf: Vec<u8>,
    emitter: Emitter,
}

impl Device {
    /// Create a device in its power-on state.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            device_id = config.device_id,
            channels = config.channels.len(),
            "device initialized (mode=continuous, stream=stopped)"
        );
        Ok(Self {
            state: DeviceState::new(&config),
            data_buf: Vec::with_capacity(config.max_data_payload()),
            config,
            rng,
            seq: 0,
            payload_buf: vec![0u8; MAX_PAYLOAD_SIZE],
            emitter: Emitter {
                frame_buf: vec![0u8; MAX_FRAME_SIZE],
                stats: DeviceStats::default(),
            },
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn stats(&self) -> DeviceStats {
        self.emitter.stats
    }

    /// Validate one extracted frame and dispatch it.
    ///
    /// Malformed frames are dropped without a response.
    pub fn handle_frame(&mut self, frame: &[u8], now_ms: u64, tx: &mut TxQueue) {
        let header = match parse_frame(frame, &mut self.payload_buf) {
            Ok(header) => header,
            Err(err) => {
                self.emitter.stats.frames_rejected += 1;
                debug!(error = %err, class = ?err.class(), len = frame.len(), "dropping malformed frame");
                return;
            }
        };
        self.emitter.stats.frames_handled += 1;
        debug!(
            command = command_name(header.command),
            seq = header.seq,
            len = header.payload_len,
            "rx frame"
        );

        let response = match Request::parse(header.command, &self.payload_buf[..header.payload_len]) {
            Ok(request) => self.handle_request(request, now_ms),
            Err(err) => {
                debug!(command = header.command, error = %err, "rejecting request");
                Response::from(err)
            }
        };
        self.reply(tx, header.seq, &response);
    }

    /// Apply a request to the device state and produce its reply.
    pub fn handle_request(&mut self, request: Request, now_ms: u64) -> Response {
        match request {
            Request::Ping => Response::Pong {
                device_id: self.config.device_id,
            },
            Request::GetStatus => Response::Status {
                mode: self.state.mode.as_u8(),
                stream: self.state.stream.as_u8(),
                error_flag: 0,
                error_code: 0,
            },
            Request::GetDeviceInfo => self.device_info(),
            Request::SetModeContinuous => {
                self.state.mode = Mode::Continuous;
                self.state.trigger.reset();
                info!("mode changed to continuous");
                Response::Ack
            }
            Request::SetModeTrigger => {
                self.state.mode = Mode::Trigger;
                self.state.trigger.reset();
                self.state.trigger.armed = true;
                let delay = self.config.trigger_delay.sample(&mut self.rng);
                self.state.trigger.next_trigger_ms = now_ms + delay;
                info!(delay_ms = delay, "mode changed to trigger");
                Response::Ack
            }
            Request::StartStream => {
                self.state.stream = StreamStatus::Running;
                self.state.last_data_ms = None;
                info!("stream started");
                Response::Ack
            }
            Request::StopStream => {
                self.stop();
                Response::Ack
            }
            Request::ConfigureStream(configs) => {
                self.configure_channels(&configs);
                Response::Ack
            }
            Request::RequestBufferedData => {
                if self.state.mode == Mode::Trigger && self.state.trigger.occurred {
                    Response::Ack
                } else {
                    ProtocolError::Status(0x02).into()
                }
            }
        }
    }

    /// Stop streaming and abort any burst in flight.
    pub fn stop(&mut self) {
        if self.state.is_running() {
            info!("stream stopped");
        }
        self.state.stream = StreamStatus::Stopped;
        self.state.trigger.sending = false;
        self.state.trigger.occurred = false;
    }

    /// Advance time. Emits data packets and trigger events that are due.
    pub fn tick(&mut self, now_ms: u64, tx: &mut TxQueue) {
        if !self.state.is_running() {
            return;
        }
        match self.state.mode {
            Mode::Trigger => self.tick_trigger(now_ms, tx),
            Mode::Continuous => {
                if self.data_due(now_ms) {
                    self.send_data_packet(now_ms, tx);
                    self.state.last_data_ms = Some(now_ms);
                }
            }
        }
    }

    fn tick_trigger(&mut self, now_ms: u64, tx: &mut TxQueue) {
        let trigger = self.state.trigger;
        if trigger.armed && !trigger.occurred && now_ms >= trigger.next_trigger_ms {
            let event = Response::EventTriggered {
                timestamp: now_ms as u32,
                channel: 0,
                pre_samples: self.config.pre_trigger_samples,
                post_samples: self.config.post_trigger_samples,
            };
            self.send_unsolicited(tx, &event);

            let packets = self
                .rng
                .gen_range(self.config.burst_packets_min..=self.config.burst_packets_max);
            let t = &mut self.state.trigger;
            t.occurred = true;
            t.sending = true;
            t.timestamp_ms = now_ms;
            t.packets_to_send = packets;
            t.packets_sent = 0;
            info!(timestamp_ms = now_ms, packets, "trigger fired");
        }

        if !self.state.trigger.sending || !self.data_due(now_ms) {
            return;
        }

        let t = self.state.trigger;
        if t.packets_sent < t.packets_to_send {
            let stamp = t.timestamp_ms + u64::from(t.packets_sent) * self.config.data_interval_ms;
            self.send_data_packet(stamp, tx);
            self.state.trigger.packets_sent += 1;
            self.state.last_data_ms = Some(now_ms);
            debug!(
                sent = t.packets_sent + 1,
                total = t.packets_to_send,
                "trigger packet sent"
            );
        } else {
            self.send_unsolicited(tx, &Response::BufferTransferComplete);
            let delay = self.config.trigger_rearm.sample(&mut self.rng);
            let t = &mut self.state.trigger;
            t.sending = false;
            t.occurred = false;
            t.next_trigger_ms = now_ms + delay;
            info!(next_in_ms = delay, "trigger burst complete");
        }
    }

    fn data_due(&self, now_ms: u64) -> bool {
        self.state
            .last_data_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.config.data_interval_ms)
    }

    fn configure_channels(&mut self, configs: &[ChannelConfig]) {
        for cfg in configs {
            let Some(channel) = self.state.channels.get_mut(usize::from(cfg.channel_id)) else {
                debug!(channel = cfg.channel_id, "ignoring config for unknown channel");
                continue;
            };
            channel.enabled = cfg.sample_rate > 0;
            channel.sample_rate = cfg.sample_rate;
            channel.format = cfg.format;
            info!(
                channel = cfg.channel_id,
                rate = cfg.sample_rate,
                format = cfg.format,
                "channel configured"
            );
        }
    }

    fn device_info(&self) -> Response {
        Response::DeviceInfo {
            protocol_version: self.config.protocol_version,
            firmware_version: self.config.firmware_version,
            channels: self
                .config
                .channels
                .iter()
                .enumerate()
                .map(|(i, spec)| ChannelInfo {
                    channel_id: i as u8,
                    max_sample_rate: spec.max_sample_rate,
                    formats: spec.formats,
                    name: spec.name.clone(),
                })
                .collect(),
        }
    }

    /// Build `[timestamp u32][mask u16][samples u16]` plus samples of every
    /// enabled channel and queue it.
    fn send_data_packet(&mut self, timestamp_ms: u64, tx: &mut TxQueue) {
        let timestamp = timestamp_ms as u32;
        let mask = self.state.channel_mask();
        let samples = self.config.samples_per_packet;
        let signal = self.config.signal;

        self.data_buf.clear();
        self.data_buf.put_u32_le(timestamp);
        self.data_buf.put_u16_le(mask);
        self.data_buf.put_u16_le(samples);
        for _ in 0..mask.count_ones() {
            for i in 0..samples {
                let t = (f64::from(timestamp) + f64::from(i)) * 0.001;
                let wave = signal.amplitude * (2.0 * PI * signal.frequency_hz * t).sin();
                let jitter = if signal.noise > 0 {
                    self.rng.gen_range(-signal.noise..signal.noise)
                } else {
                    0
                };
                let value = (wave + f64::from(jitter)).clamp(f64::from(i16::MIN), f64::from(i16::MAX));
                self.data_buf.put_i16_le(value as i16);
            }
        }

        let seq = self.next_seq();
        self.emitter.emit(tx, command::DATA_PACKET, seq, &self.data_buf);
    }

    fn send_unsolicited(&mut self, tx: &mut TxQueue, response: &Response) {
        self.data_buf.clear();
        response.write_payload(&mut self.data_buf);
        let seq = self.next_seq();
        self.emitter.emit(tx, response.command(), seq, &self.data_buf);
    }

    fn reply(&mut self, tx: &mut TxQueue, seq: u8, response: &Response) {
        self.data_buf.clear();
        response.write_payload(&mut self.data_buf);
        self.emitter.emit(tx, response.command(), seq, &self.data_buf);
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }
}
