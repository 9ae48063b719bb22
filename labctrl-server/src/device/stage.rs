//! Linear stage command dispatch, grounded on
//! `original_source/linear_stage/generic/linear_stage.py`'s
//! `set_position`/`set_velocity`/`set_acceleration`/`stop`/`home` and the
//! line-protocol verbs `hardware_mocker.py` recognizes (`MOVEABS`,
//! `MOVEREL`, `STOP`, `HOME`, `GETPOS`).

use labctrl_core::{CommandResponse, OperationResult, StageOperation};

use super::{DeviceSession, DeviceSessionError};
use crate::transport::Transport;

const POSITION: &str = "position";
const VELOCITY: &str = "velocity";
const ACCELERATION: &str = "acceleration";

fn expect_ok(reply: &[u8]) -> Result<(), DeviceSessionError> {
    if reply == b"OK" {
        Ok(())
    } else {
        Err(DeviceSessionError::Device(
            String::from_utf8_lossy(reply).into_owned(),
        ))
    }
}

pub async fn dispatch<T: Transport>(
    session: &DeviceSession<T>,
    op: StageOperation,
) -> Result<CommandResponse, DeviceSessionError> {
    match op {
        StageOperation::SetPosition { target } => {
            session
                .apply_target(
                    POSITION,
                    target.resolve()?,
                    |v| format!("MOVEABS {v}").into_bytes(),
                    expect_ok,
                )
                .await
        }
        StageOperation::SetVelocity { target } => {
            session
                .apply_target(
                    VELOCITY,
                    target.resolve()?,
                    |v| format!("SETVEL {v}").into_bytes(),
                    expect_ok,
                )
                .await
        }
        StageOperation::SetAcceleration { target } => {
            session
                .apply_target(
                    ACCELERATION,
                    target.resolve()?,
                    |v| format!("SETACC {v}").into_bytes(),
                    expect_ok,
                )
                .await
        }
        StageOperation::Stop => {
            let mut transport = session.lock_transport().await;
            transport.send(b"STOP").await?;
            let reply = transport.recv(session.command_timeout()).await?;
            expect_ok(&reply)?;
            let position = session.state.read().await.parameter(POSITION).map(|p| p.value).unwrap_or(0);
            Ok(CommandResponse::ok(position))
        }
        StageOperation::Home => {
            let mut transport = session.lock_transport().await;
            transport.send(b"HOME").await?;
            let reply = transport.recv(session.command_timeout()).await?;
            expect_ok(&reply)?;
            drop(transport);
            let mut state = session.state.write().await;
            if let Some(spec) = state.parameter_mut(POSITION) {
                spec.value = spec.default;
            }
            let value = state.parameter(POSITION).map(|p| p.value).unwrap_or(0);
            Ok(CommandResponse::ok(value))
        }
        StageOperation::GetStatus => {
            let state = session.state.read().await;
            let value = state.parameter(POSITION).map(|p| p.value).unwrap_or(0);
            Ok(CommandResponse {
                result: OperationResult::Ok,
                value: Some(value),
                message: None,
            })
        }
    }
}
