//! High-level remote device handles.
//!
//! Grounded on `api.py`'s `RemoteLinearStage`: one object per device that
//! authenticates on construction, starts its watchdogs and persistent
//! channel, exposes `set_position`/`set_velocity`/... convenience methods
//! built on top of `websocket_command`, and tears everything down in
//! `close()`. `RemoteStage` and `RemoteSensor` share the same watchdog/
//! channel/cache wiring through `DeviceHandle` instead of duplicating it,
//! since the original's `RemoteLinearStage` and the sensor API's
//! equivalent class differ only in which operations they expose.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;

use labctrl_core::{CommandResponse, SensorOperation, StageOperation, Target};

use crate::cache::ParameterCache;
use crate::config::ClientConfig;
use crate::rest::{RestClient, RestError};
use crate::watchdogs::{spawn_auth_watchdog, spawn_state_watchdog, Watchdog};
use crate::ws_client::{ChannelClient, ChannelError};

/// Default timeout for a channel command issued through a convenience
/// method, e.g. `set_position`. Callers needing a different timeout or
/// fire-and-forget semantics can reach for `ChannelClient` directly.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

struct DeviceHandle {
    rest: RestClient,
    channel: ChannelClient,
    token: Arc<RwLock<String>>,
    cache: ParameterCache,
    auth_watchdog: Watchdog,
    state_watchdog: Watchdog,
}

impl DeviceHandle {
    async fn connect(config: &ClientConfig, device: &str, parameter_name: &str) -> Result<Self, ClientError> {
        let rest = RestClient::new(config.restful.base_url());
        let initial_token = if config.authentication.access_token.is_empty() {
            rest.issue_token(&config.authentication.username, &config.authentication.password)
                .await?
        } else {
            config.authentication.access_token.clone()
        };
        let token = Arc::new(RwLock::new(initial_token));
        let cache = ParameterCache::new();

        let auth_watchdog = spawn_auth_watchdog(
            rest.clone(),
            config.authentication.username.clone(),
            config.authentication.password.clone(),
            token.clone(),
        );
        let state_watchdog = spawn_state_watchdog(
            rest.clone(),
            token.clone(),
            cache.clone(),
            device.to_string(),
            parameter_name.to_string(),
        );
        let channel = ChannelClient::start(config.websocket.url(), token.clone(), cache.clone());

        Ok(Self {
            rest,
            channel,
            token,
            cache,
            auth_watchdog,
            state_watchdog,
        })
    }

    async fn close(&mut self) {
        self.auth_watchdog.stop().await;
        self.state_watchdog.stop().await;
        self.channel.stop().await;
    }
}

/// Mirrors `RemoteLinearStage`.
pub struct RemoteStage {
    handle: DeviceHandle,
}

impl RemoteStage {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let handle = DeviceHandle::connect(&config, "stage", "position").await?;
        Ok(Self { handle })
    }

    /// The last known position, kept current by the state watchdog and by
    /// broadcast frames, never by a blocking remote call.
    pub async fn position(&self) -> Option<i64> {
        self.handle.cache.get("position").await
    }

    async fn token(&self) -> String {
        self.handle.token.read().await.clone()
    }

    pub async fn set_position(&self, target: Target) -> Result<CommandResponse, ClientError> {
        let op = StageOperation::SetPosition { target: target.into() };
        Ok(self.handle.channel.command(&op, COMMAND_TIMEOUT).await?)
    }

    pub async fn set_velocity(&self, target: Target) -> Result<CommandResponse, ClientError> {
        let op = StageOperation::SetVelocity { target: target.into() };
        Ok(self.handle.channel.command(&op, COMMAND_TIMEOUT).await?)
    }

    pub async fn set_acceleration(&self, target: Target) -> Result<CommandResponse, ClientError> {
        let op = StageOperation::SetAcceleration { target: target.into() };
        Ok(self.handle.channel.command(&op, COMMAND_TIMEOUT).await?)
    }

    pub async fn stop(&self) -> Result<CommandResponse, ClientError> {
        Ok(self.handle.channel.command(&StageOperation::Stop, COMMAND_TIMEOUT).await?)
    }

    pub async fn home(&self) -> Result<CommandResponse, ClientError> {
        Ok(self.handle.channel.command(&StageOperation::Home, COMMAND_TIMEOUT).await?)
    }

    /// Bypasses the channel and reads status directly over REST, mirroring
    /// `rest_get_position`.
    pub async fn rest_status(&self) -> Result<CommandResponse, ClientError> {
        Ok(self.handle.rest.stage_status(&self.token().await).await?)
    }

    pub async fn close(mut self) {
        self.handle.close().await;
    }
}

/// Mirrors the sensor API's equivalent of `RemoteLinearStage`.
pub struct RemoteSensor {
    handle: DeviceHandle,
}

impl RemoteSensor {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let handle = DeviceHandle::connect(&config, "sensor", "value").await?;
        Ok(Self { handle })
    }

    pub async fn value(&self) -> Option<i64> {
        self.handle.cache.get("value").await
    }

    async fn token(&self) -> String {
        self.handle.token.read().await.clone()
    }

    pub async fn get_sample(&self) -> Result<CommandResponse, ClientError> {
        Ok(self
            .handle
            .channel
            .command(&SensorOperation::GetSample, COMMAND_TIMEOUT)
            .await?)
    }

    pub async fn get_data_batch(&self, batch_size: u32) -> Result<CommandResponse, ClientError> {
        Ok(self
            .handle
            .channel
            .command(&SensorOperation::GetDataBatch { batch_size }, COMMAND_TIMEOUT)
            .await?)
    }

    pub async fn start_continuous_sampling(&self) -> Result<CommandResponse, ClientError> {
        Ok(self
            .handle
            .channel
            .command(&SensorOperation::StartContinuousSampling, COMMAND_TIMEOUT)
            .await?)
    }

    pub async fn stop_continuous_sampling(&self) -> Result<CommandResponse, ClientError> {
        Ok(self
            .handle
            .channel
            .command(&SensorOperation::StopContinuousSampling, COMMAND_TIMEOUT)
            .await?)
    }

    pub async fn rest_status(&self) -> Result<CommandResponse, ClientError> {
        Ok(self.handle.rest.sensor_status(&self.token().await).await?)
    }

    pub async fn close(mut self) {
        self.handle.close().await;
    }
}
