//! COBS-framed binary transport, grounded on
//! `original_source/sensor/generic/sensor.py` and `hardware_mocker.py`: each
//! command/response is a CBOR-encoded blob, COBS-stuffed so the frame never
//! contains an interior `0x00`, and terminated with a trailing `0x00` byte
//! that marks the end of frame on the wire.
//!
//! This module only owns the framing (COBS stuffing + `0x00` delimiter);
//! CBOR encoding/decoding of the payload itself is the caller's job
//! (`device::sensor`), keeping this adapter agnostic to what's inside a
//! frame.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Transport, TransportError};

const DELIMITER: u8 = 0x00;
const MAX_FRAME_LEN: usize = 8192;

pub struct CobsTransport<S> {
    io: S,
    read_buf: Vec<u8>,
}

impl<S> CobsTransport<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            read_buf: Vec::new(),
        }
    }
}

impl<S> CobsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(pos) = self.read_buf.iter().position(|&b| b == DELIMITER) {
                let frame = self.read_buf.drain(..=pos).collect::<Vec<u8>>();
                let encoded = &frame[..frame.len() - 1];
                return cobs::decode_vec(encoded)
                    .map_err(|_| TransportError::Framing("invalid COBS frame".into()));
            }
            if self.read_buf.len() >= MAX_FRAME_LEN {
                self.read_buf.clear();
                return Err(TransportError::Framing(
                    "frame exceeded maximum length without a delimiter".into(),
                ));
            }
            let mut chunk = [0u8; 256];
            let n = self.io.read(&mut chunk).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}

impl<S> Transport for CobsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.io.flush().await?;
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let encoded = cobs::encode_vec(payload);
        self.io.write_all(&encoded).await?;
        self.io.write_all(&[DELIMITER]).await?;
        self.io.flush().await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        tokio::time::timeout(timeout, self.read_frame())
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_cobs_frame_containing_a_zero_byte() {
        let (client_io, mut server_io) = duplex(64);
        let mut transport = CobsTransport::new(client_io);

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = server_io.read(&mut buf).await.unwrap();
            let decoded = cobs::decode_vec(&buf[..n - 1]).unwrap();
            assert_eq!(decoded, vec![1, 0, 2, 3]);
            let encoded = cobs::encode_vec(&[9, 0, 8]);
            server_io.write_all(&encoded).await.unwrap();
            server_io.write_all(&[DELIMITER]).await.unwrap();
        });

        transport.send(&[1, 0, 2, 3]).await.unwrap();
        let response = transport.recv(Duration::from_secs(1)).await.unwrap();
        assert_eq!(response, vec![9, 0, 8]);
    }
}
