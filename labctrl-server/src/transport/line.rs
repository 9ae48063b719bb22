//! `\r`-terminated ASCII line framing, grounded on
//! `original_source/linear_stage/generic/linear_stage.py`'s serial command
//! helper and `hardware_mocker.py`'s `b'MOVEABS' -> b'OK\r'` exchange: one
//! command per line, terminated by `\r`, response read up to the next `\r`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Transport, TransportError};

const TERMINATOR: u8 = b'\r';
/// Matches `hardware_config.py`'s serial settings; guards against a
/// transport that never sends a terminator from growing this buffer
/// without bound.
const MAX_LINE_LEN: usize = 4096;

pub struct LineTransport<S> {
    io: S,
    read_buf: Vec<u8>,
}

impl<S> LineTransport<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            read_buf: Vec::new(),
        }
    }
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(pos) = self.read_buf.iter().position(|&b| b == TERMINATOR) {
                let line = self.read_buf.drain(..=pos).collect::<Vec<u8>>();
                return Ok(line[..line.len() - 1].to_vec());
            }
            if self.read_buf.len() >= MAX_LINE_LEN {
                self.read_buf.clear();
                return Err(TransportError::Framing(
                    "line exceeded maximum length without a terminator".into(),
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

impl<S> Transport for LineTransport<S>
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
        self.io.write_all(payload).await?;
        self.io.write_all(&[TERMINATOR]).await?;
        self.io.flush().await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        tokio::time::timeout(timeout, self.read_line())
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_terminated_line() {
        let (client_io, mut server_io) = duplex(64);
        let mut transport = LineTransport::new(client_io);

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = server_io.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"MOVEABS 100\r");
            server_io.write_all(b"OK\r").await.unwrap();
        });

        transport.send(b"MOVEABS 100").await.unwrap();
        let response = transport.recv(Duration::from_secs(1)).await.unwrap();
        assert_eq!(response, b"OK");
    }
}
