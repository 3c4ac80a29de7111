//! Minimal host: connects to a running device, configures channel 0,
//! starts a continuous stream and prints a few data packets.
//!
//! Start a device first:
//!   cargo run --features cli -- run --listen 127.0.0.1:9001
//!
//! Then:
//!   cargo run --example tcp-host -- 127.0.0.1:9001

use std::io::{Read, Write};
use std::net::TcpStream;

use daqsim::device::{ChannelConfig, Request, Response};
use daqsim::frame::{decode_frame, Frame, RxBuffer, MAX_FRAME_SIZE};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9001".to_string());
    let mut stream = TcpStream::connect(&addr)?;
    eprintln!("connected to {addr}");

    let requests = [
        Request::ConfigureStream(vec![
            ChannelConfig {
                channel_id: 0,
                sample_rate: 10_000,
                format: 1,
            },
            ChannelConfig {
                channel_id: 1,
                sample_rate: 0,
                format: 1,
            },
        ]),
        Request::SetModeContinuous,
        Request::StartStream,
    ];
    for (seq, request) in requests.iter().enumerate() {
        let frame = Frame::new(request.command(), seq as u8 + 1, request.payload());
        stream.write_all(&frame.encode()?)?;
    }

    let mut rx = RxBuffer::new();
    let mut buf = [0u8; 4096];
    let mut scratch = vec![0u8; MAX_FRAME_SIZE];
    let mut packets = 0;
    while packets < 5 {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            eprintln!("device closed the connection");
            break;
        }
        rx.feed(&buf[..n]);
        while let Some(len) = rx.extract_frame(&mut scratch) {
            let frame = decode_frame(&scratch[..len])?;
            match Response::decode(frame.command, &frame.payload) {
                Some(Response::DataPacket(packet)) => {
                    packets += 1;
                    println!(
                        "t={}ms mask={:#06b} first samples={:?}",
                        packet.timestamp,
                        packet.channel_mask,
                        &packet.samples[0][..4.min(packet.samples[0].len())]
                    );
                }
                Some(other) => println!("seq={} {other:?}", frame.seq),
                None => println!("seq={} command={:#04x}", frame.seq, frame.command),
            }
        }
    }

    let stop = Request::StopStream;
    stream.write_all(&Frame::new(stop.command(), 4, stop.payload()).encode()?)?;
    Ok(())
}
