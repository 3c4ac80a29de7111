//! Drive a device over the in-process loopback transport with a hand clock.
//!
//! Run with:
//!   cargo run --example loopback-session
//!
//! Switches to continuous mode, streams for 50 simulated milliseconds and
//! prints every frame the device sends.

use daqsim::device::{
    Clock, DeviceConfig, ManualClock, Request, Response, Session, SessionConfig,
};
use daqsim::frame::{command_name, decode_frame, Frame, RxBuffer, MAX_FRAME_SIZE};
use daqsim::transport::LoopbackTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, host) = LoopbackTransport::new();
    let config = DeviceConfig {
        seed: Some(1),
        samples_per_packet: 4,
        ..DeviceConfig::default()
    };
    let mut session = Session::new(transport, SessionConfig::default(), config)?;
    session.start()?;

    for (seq, request) in [
        (1, Request::Ping),
        (2, Request::SetModeContinuous),
        (3, Request::StartStream),
    ] {
        host.inject(&Frame::new(request.command(), seq, request.payload()).encode()?);
    }

    let clock = ManualClock::new(0);
    while clock.now_ms() <= 50 {
        session.poll_once(clock.now_ms())?;
        clock.advance(1);
    }

    let mut rx = RxBuffer::new();
    let mut scratch = vec![0u8; MAX_FRAME_SIZE];
    rx.feed(&host.take_sent());
    rx.drain_frames(&mut scratch, |wire| {
        let Ok(frame) = decode_frame(wire) else {
            return;
        };
        match Response::decode(frame.command, &frame.payload) {
            Some(Response::DataPacket(packet)) => println!(
                "seq={:3} DATA_PACKET t={}ms ch0={:?}",
                frame.seq, packet.timestamp, packet.samples[0]
            ),
            other => println!(
                "seq={:3} {} {:?}",
                frame.seq,
                command_name(frame.command),
                other
            ),
        }
    });

    session.shutdown();
    println!("{:?}", session.stats());
    Ok(())
}
