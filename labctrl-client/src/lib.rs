//! Client library for the shared-device laboratory instrument session
//! server: REST + persistent-channel access, three background watchdogs,
//! and a local parameter cache, mirroring
//! `original_source/linear_stage/api/python/api.py`'s `RemoteLinearStage`.

pub mod cache;
pub mod client;
pub mod config;
pub mod rest;
pub mod watchdogs;
pub mod ws_client;

pub use cache::ParameterCache;
pub use client::{ClientError, RemoteSensor, RemoteStage};
pub use config::{AuthConfig, ClientConfig, ConfigError, RestfulConfig, WebsocketConfig};
pub use rest::{RestClient, RestError};
pub use watchdogs::Watchdog;
pub use ws_client::{ChannelClient, ChannelError};
