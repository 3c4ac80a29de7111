use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use daqsim_frame::{command::is_unsolicited, decode_frame, Frame, RxBuffer, MAX_FRAME_SIZE};
use tracing::debug;

use crate::cmd::{parse_duration, parse_hex, SendArgs};
use crate::exit::{
    frame_error, io_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_frame, OutputFormat};

/// Read timeout per socket poll while waiting for the reply.
const READ_SLICE: Duration = Duration::from_millis(50);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = parse_hex(&args.payload)?;
    let wire = Frame::new(args.command, args.seq, payload)
        .encode()
        .map_err(|err| frame_error("cannot encode frame", err))?;

    let addr = resolve(&args.addr)?;
    let mut stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|err| io_error(&format!("connect to {addr} failed"), err))?;
    stream
        .set_read_timeout(Some(READ_SLICE))
        .map_err(|err| io_error("socket setup failed", err))?;
    stream
        .write_all(&wire)
        .map_err(|err| io_error("send failed", err))?;
    debug!(command = args.command, seq = args.seq, bytes = wire.len(), "frame sent");

    let reply = wait_for_reply(&mut stream, args.seq, Instant::now() + timeout)?;
    print_frame(&reply, format);
    Ok(SUCCESS)
}

fn resolve(addr: &str) -> CliResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|err| CliError::new(USAGE, format!("invalid address {addr}: {err}")))?
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("address {addr} did not resolve")))
}

/// Read frames until the reply with `seq` arrives. Unsolicited frames
/// (data packets, trigger events) are skipped.
fn wait_for_reply<R: Read>(reader: &mut R, seq: u8, deadline: Instant) -> CliResult<Frame> {
    let mut rx = RxBuffer::new();
    let mut buf = [0u8; 4096];
    let mut scratch = vec![0u8; MAX_FRAME_SIZE];

    loop {
        while let Some(len) = rx.extract_frame(&mut scratch) {
            let frame =
                decode_frame(&scratch[..len]).map_err(|err| frame_error("bad reply", err))?;
            if frame.seq == seq && !is_unsolicited(frame.command) {
                return Ok(frame);
            }
            debug!(command = frame.command, seq = frame.seq, "skipping frame");
        }

        if Instant::now() >= deadline {
            return Err(CliError::new(TIMEOUT, "timed out waiting for reply"));
        }

        match reader.read(&mut buf) {
            Ok(0) => return Err(CliError::new(FAILURE, "device closed the connection")),
            Ok(n) => {
                rx.feed(&buf[..n]);
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(io_error("receive failed", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use daqsim_frame::command;

    use super::*;

    fn wire(command_id: u8, seq: u8, payload: &[u8]) -> Vec<u8> {
        Frame::new(command_id, seq, payload.to_vec())
            .encode()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn skips_unsolicited_and_other_seqs() {
        let mut bytes = wire(command::DATA_PACKET, 7, &[0; 8]);
        bytes.extend(wire(command::ACK, 6, &[]));
        bytes.extend([0x00, 0x13]);
        bytes.extend(wire(command::PONG, 7, &[1, 0, 0, 0, 0, 0, 0, 0]));

        let mut reader = Cursor::new(bytes);
        let deadline = Instant::now() + Duration::from_secs(1);
        let frame = wait_for_reply(&mut reader, 7, deadline).unwrap();
        assert_eq!(frame.command, command::PONG);
        assert_eq!(frame.seq, 7);
    }

    #[test]
    fn closed_stream_is_failure() {
        let mut reader = Cursor::new(wire(command::ACK, 1, &[]));
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = wait_for_reply(&mut reader, 2, deadline).unwrap_err();
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn expired_deadline_times_out() {
        struct Idle;
        impl Read for Idle {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(ErrorKind::WouldBlock.into())
            }
        }
        let err = wait_for_reply(&mut Idle, 0, Instant::now()).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn resolve_rejects_garbage() {
        assert_eq!(resolve("not an address").unwrap_err().code, USAGE);
        assert!(resolve("127.0.0.1:9001").is_ok());
    }
}
