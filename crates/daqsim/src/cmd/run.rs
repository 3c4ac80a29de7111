use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use daqsim_device::{
    ChannelConfig, DeviceConfig, DeviceError, MonotonicClock, Request, Response, Session,
    SessionConfig,
};
use daqsim_frame::{command_name, decode_frame, Frame, RxBuffer, MAX_FRAME_SIZE};
use daqsim_transport::{
    LoopbackHandle, LoopbackTransport, SerialConfig, SerialTransport, TcpConfig, TcpTransport,
    Transport, TransportError,
};
use tracing::{info, warn};

use crate::cmd::{parse_duration, RunArgs, TransportKind};
use crate::exit::{device_error, frame_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_summary, OutputFormat, RunSummary};

/// Poll period of the loopback host thread.
const HOST_POLL: Duration = Duration::from_millis(5);

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let device_config = load_config(&args)?;
    let session_config = SessionConfig::default();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;
    if let Some(duration) = &args.duration {
        let limit = parse_duration(duration)?;
        spawn_deadline(Arc::clone(&running), limit);
    }

    let started = Instant::now();
    let mut summary = match args.transport {
        TransportKind::Tcp => {
            let config = TcpConfig::parse(&args.listen)
                .map_err(|err| transport_error("invalid --listen", err))?;
            info!(addr = %config.addr(), "starting tcp device");
            drive(TcpTransport::new(config), session_config, device_config, &running)?
        }
        TransportKind::Serial => {
            let path = args.serial_path.clone().ok_or_else(|| {
                CliError::new(USAGE, "--serial-path is required with --transport serial")
            })?;
            let config = SerialConfig {
                baud_rate: args.baud,
                ..SerialConfig::new(path)
            };
            drive(SerialTransport::new(config), session_config, device_config, &running)?
        }
        TransportKind::Loopback => {
            run_loopback(session_config, device_config, !args.no_demo, &running)?
        }
    };
    summary.elapsed_ms = started.elapsed().as_millis() as u64;

    print_summary(&summary, format);
    Ok(SUCCESS)
}

fn load_config(args: &RunArgs) -> CliResult<DeviceConfig> {
    let mut config = match &args.config {
        Some(path) => DeviceConfig::from_json_file(path).map_err(|err| {
            device_error(&format!("failed loading {}", path.display()), err)
        })?,
        None => DeviceConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

fn spawn_deadline(running: Arc<AtomicBool>, limit: Duration) {
    thread::spawn(move || {
        thread::sleep(limit);
        if running.swap(false, Ordering::SeqCst) {
            info!(?limit, "run duration reached");
        }
    });
}

/// Bind a session to `transport` and run it until stopped.
///
/// A host hanging up ends the run normally.
fn drive<T: Transport>(
    transport: T,
    session_config: SessionConfig,
    device_config: DeviceConfig,
    running: &AtomicBool,
) -> CliResult<RunSummary> {
    let name = transport.name();
    let mut session = Session::new(transport, session_config, device_config)
        .map_err(|err| device_error("session setup failed", err))?;
    session
        .start()
        .map_err(|err| device_error("transport start failed", err))?;

    let clock = MonotonicClock::new();
    let result = session.run(&clock, running);
    let session_stats = match result {
        Ok(stats) => stats,
        Err(DeviceError::Transport(err)) if is_disconnect(&err) => {
            info!(transport = name, reason = %err, "host disconnected");
            session.stats()
        }
        Err(err) => {
            session.shutdown();
            return Err(device_error("session failed", err));
        }
    };

    let device_stats = session.device().stats();
    session.shutdown();
    Ok(RunSummary {
        transport: name,
        elapsed_ms: 0,
        session: session_stats,
        device: device_stats,
    })
}

fn is_disconnect(err: &TransportError) -> bool {
    match err {
        TransportError::PeerClosed => true,
        TransportError::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}

fn run_loopback(
    session_config: SessionConfig,
    device_config: DeviceConfig,
    demo: bool,
    running: &AtomicBool,
) -> CliResult<RunSummary> {
    let (transport, handle) = LoopbackTransport::new();
    if demo {
        inject_demo(&handle)?;
    }

    let host_running = AtomicBool::new(true);
    thread::scope(|scope| {
        thread::Builder::new()
            .name("loopback-host".into())
            .spawn_scoped(scope, || host_loop(&handle, &host_running))
            .map_err(|err| crate::exit::io_error("failed spawning host thread", err))?;

        let result = drive(transport, session_config, device_config, running);
        host_running.store(false, Ordering::SeqCst);
        result
    })
}

/// Host commands replayed against a loopback device: probe, configure both
/// channels at 10 kHz int16, arm trigger mode, start streaming.
fn demo_requests() -> Vec<(u8, Request)> {
    let channel = |channel_id| ChannelConfig {
        channel_id,
        sample_rate: 10_000,
        format: 1,
    };
    vec![
        (0, Request::Ping),
        (1, Request::GetDeviceInfo),
        (2, Request::ConfigureStream(vec![channel(0), channel(1)])),
        (3, Request::SetModeTrigger),
        (4, Request::StartStream),
    ]
}

fn inject_demo(handle: &LoopbackHandle) -> CliResult<()> {
    for (seq, request) in demo_requests() {
        let wire = Frame::new(request.command(), seq, request.payload())
            .encode()
            .map_err(|err| frame_error("failed encoding demo frame", err))?;
        let accepted = handle.inject(&wire);
        if accepted != wire.len() {
            warn!(seq, accepted, "demo frame truncated by loopback queue");
        }
        info!(seq, command = command_name(request.command()), "host queued");
    }
    Ok(())
}

/// Collect and log everything the device sends until `running` clears.
fn host_loop(handle: &LoopbackHandle, running: &AtomicBool) {
    let mut rx = RxBuffer::new();
    let mut scratch = vec![0u8; MAX_FRAME_SIZE];
    let mut data_packets = 0u64;

    loop {
        let stopping = !running.load(Ordering::SeqCst);
        let sent = handle.take_sent();
        let mut offset = 0;
        while offset < sent.len() {
            let accepted = rx.feed(&sent[offset..]);
            offset += accepted;
            rx.drain_frames(&mut scratch, |wire| match decode_frame(wire) {
                Ok(frame) => log_frame(&frame, &mut data_packets),
                Err(err) => warn!(error = %err, "host received undecodable frame"),
            });
            if accepted == 0 {
                warn!(lost = sent.len() - offset, "host buffer stuck, dropping bytes");
                rx.reset();
            }
        }
        if stopping {
            break;
        }
        thread::sleep(HOST_POLL);
    }
    info!(data_packets, "host stopped");
}

fn log_frame(frame: &Frame, data_packets: &mut u64) {
    let name = command_name(frame.command);
    match Response::decode(frame.command, frame.payload.as_ref()) {
        Some(Response::DataPacket(packet)) => {
            *data_packets += 1;
            tracing::debug!(
                seq = frame.seq,
                timestamp = packet.timestamp,
                channel_mask = packet.channel_mask,
                samples = packet.samples_per_channel,
                "host got data packet"
            );
        }
        Some(response) => info!(seq = frame.seq, command = name, ?response, "host got frame"),
        None => warn!(seq = frame.seq, command = name, "host got unknown frame"),
    }
}
