//! Transport Adapter: the boundary between a device session and the bytes
//! that actually travel to an instrument.
//!
//! `original_source` implements this boundary twice — `linear_stage.py`'s
//! `\r`-terminated ASCII line protocol over a `pyserial` handle, and
//! `sensor.py`'s COBS-framed CBOR blobs over the same kind of handle — and
//! swaps in `hardware_mocker.py` for tests by replacing the serial handle
//! in place. Here that becomes one `Transport` trait with three
//! implementations (`line`, `cobs`, `mock`); a `DeviceSession<T: Transport>`
//! is generic over which one it holds, so swapping in `MockTransport` for
//! tests requires no conditional branches in the session logic itself,
//! unlike the Python original's `IS_TESTING` flag.

pub mod cobs_framing;
pub mod line;
pub mod mock;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error on transport: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport timed out waiting for a response")]
    Timeout,
    #[error("transport closed")]
    Closed,
    #[error("malformed frame: {0}")]
    Framing(String),
}

/// A byte-oriented full-duplex port to an instrument: `open`/`close` bracket
/// its lifetime, `send` writes a command's raw bytes, and `recv` waits up to
/// `timeout` for one framed response before giving up with
/// `TransportError::Timeout`. Every device session issues commands strictly
/// one at a time (guarded by its own command mutex), so these never need to
/// be called concurrently on the same transport.
pub trait Transport: Send {
    fn open(&mut self) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
    fn close(&mut self) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
    fn send(
        &mut self,
        payload: &[u8],
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
    fn recv(
        &mut self,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, TransportError>> + Send;
}
