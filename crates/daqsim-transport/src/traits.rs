use crate::error::Result;

/// The byte-stream capability the device engine runs on.
///
/// Implementations carry their own typed configuration, supplied when the
/// value is constructed; `init` performs the fallible resource acquisition.
///
/// Contract:
/// - `recv` never blocks. `Ok(0)` means "nothing right now"; any `Err` is fatal
///   (including an orderly close by the peer).
/// - `send` must hand the whole buffer to the medium before returning, retrying
///   partial writes internally. It returns the number of bytes accepted, which
///   should equal `buf.len()`.
pub trait Transport {
    /// Acquire resources (bind sockets, open devices, start workers).
    fn init(&mut self) -> Result<()>;

    /// Block until a peer is attached. No-op for connectionless transports.
    fn wait_for_connection(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read whatever is immediately available into `buf`.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` to the peer.
    fn send(&mut self, buf: &[u8]) -> Result<usize>;

    /// Release resources. Safe to call more than once.
    fn cleanup(&mut self);

    /// Transport name for diagnostics.
    fn name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn wait_for_connection(&mut self) -> Result<()> {
        (**self).wait_for_connection()
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv(buf)
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).send(buf)
    }

    fn cleanup(&mut self) {
        (**self).cleanup()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
