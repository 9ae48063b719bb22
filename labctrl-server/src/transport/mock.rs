//! In-process mock transport, grounded on
//! `original_source/linear_stage/generic/hardware_mocker.py` (line-protocol
//! substring matching) and `original_source/sensor/generic/hardware_mocker.py`
//! (`response_generator` dispatching on a CBOR `command` field, plus
//! `burst_message_generator` for continuous-sampling tests).
//!
//! Rather than the Python original's `IS_TESTING` flag swapping the serial
//! handle at import time, `MockTransport` is just another `Transport`
//! impl — a `DeviceSession<MockTransport>` is constructed directly in
//! tests, no global flag involved.

use std::collections::VecDeque;
use std::time::Duration;

use super::{Transport, TransportError};

pub struct MockTransport {
    responder: Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>,
    pending: VecDeque<Vec<u8>>,
}

impl MockTransport {
    pub fn new(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
        }
    }

    /// Queue a frame to be returned by the next `recv` ahead of any reply to
    /// a pending `send`, for injecting unsolicited continuous-sampling
    /// bursts the way `burst_message_generator` does.
    pub fn push_unsolicited(&mut self, frame: Vec<u8>) {
        self.pending.push_back(frame);
    }

    /// A stage mock matching `hardware_mocker.py`'s substring dispatch:
    /// `MOVEABS`/`MOVEREL` -> `OK`, `GETPOS` -> the tracked position,
    /// `STOP`/`HOME` -> `OK`, anything else -> `ERR`.
    pub fn line_protocol_stage(initial_position: i64) -> Self {
        let mut position = initial_position;
        Self::new(move |request| {
            let text = String::from_utf8_lossy(request);
            let reply = if let Some(rest) = text.strip_prefix("MOVEABS ") {
                if let Ok(target) = rest.trim().parse::<i64>() {
                    position = target;
                }
                "OK".to_string()
            } else if let Some(rest) = text.strip_prefix("MOVEREL ") {
                if let Ok(delta) = rest.trim().parse::<i64>() {
                    position += delta;
                }
                "OK".to_string()
            } else if text.starts_with("GETPOS") {
                position.to_string()
            } else if text.starts_with("STOP") || text.starts_with("HOME") {
                "OK".to_string()
            } else {
                "ERR".to_string()
            };
            reply.into_bytes()
        })
    }

    /// A sensor mock matching `sensor/generic/hardware_mocker.py`'s CBOR
    /// `response_generator`: dispatches on the `command` field and replies
    /// with a CBOR map carrying `value` (and `values` for batch reads).
    pub fn cbor_protocol_sensor(initial_value: i64) -> Self {
        let mut value = initial_value;
        let mut seq: u32 = 0;
        Self::new(move |request| {
            #[derive(serde::Deserialize)]
            struct Req {
                command: String,
                batch_size: Option<u32>,
            }
            #[derive(serde::Serialize)]
            struct Resp {
                #[serde(skip_serializing_if = "Option::is_none")]
                value: Option<i64>,
                #[serde(skip_serializing_if = "Option::is_none")]
                values: Option<Vec<i64>>,
                #[serde(skip_serializing_if = "Option::is_none")]
                seq: Option<u32>,
                #[serde(skip_serializing_if = "Option::is_none")]
                error: Option<String>,
            }

            let parsed: Result<Req, _> = ciborium::de::from_reader(request);
            let resp = match parsed {
                Ok(req) => {
                    value += 1;
                    seq += 1;
                    match req.command.as_str() {
                        "get_sample" => Resp {
                            value: Some(value),
                            values: None,
                            seq: None,
                            error: None,
                        },
                        "get_data_batch" => {
                            let n = req.batch_size.unwrap_or(1).max(1);
                            let values = (0..n).map(|i| value + i as i64).collect();
                            Resp {
                                value: None,
                                values: Some(values),
                                seq: None,
                                error: None,
                            }
                        }
                        "start_continuous_sampling" | "stop_continuous_sampling" => Resp {
                            value: Some(value),
                            values: None,
                            seq: None,
                            error: None,
                        },
                        other => Resp {
                            value: None,
                            values: None,
                            seq: None,
                            error: Some(format!("unknown command: {other}")),
                        },
                    }
                }
                Err(_) => Resp {
                    value: None,
                    values: None,
                    seq: None,
                    error: Some("malformed request".into()),
                },
            };
            let _ = seq;
            let mut buf = Vec::new();
            ciborium::ser::into_writer(&resp, &mut buf).expect("CBOR encoding never fails for this shape");
            buf
        })
    }
}

impl Transport for MockTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let response = (self.responder)(payload);
        self.pending.push_back(response);
        Ok(())
    }

    /// The mock has no real clock to race against; every reply is already
    /// queued synchronously by `send`, so `timeout` only matters in that an
    /// empty queue still reports `Timeout` rather than blocking.
    async fn recv(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.pending.pop_front().ok_or(TransportError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_mock_tracks_absolute_moves() {
        let mut mock = MockTransport::line_protocol_stage(0);
        mock.send(b"MOVEABS 500").await.unwrap();
        assert_eq!(mock.recv(Duration::from_secs(1)).await.unwrap(), b"OK");
        mock.send(b"GETPOS").await.unwrap();
        assert_eq!(mock.recv(Duration::from_secs(1)).await.unwrap(), b"500");
    }

    #[tokio::test]
    async fn unsolicited_frames_are_delivered_before_command_replies() {
        let mut mock = MockTransport::line_protocol_stage(0);
        mock.push_unsolicited(b"BURST".to_vec());
        mock.send(b"GETPOS").await.unwrap();
        assert_eq!(mock.recv(Duration::from_secs(1)).await.unwrap(), b"BURST");
        assert_eq!(mock.recv(Duration::from_secs(1)).await.unwrap(), b"0");
    }
}
