//! Manual smoke-test driver for `labctrl-client`: connects one stage
//! client and one sensor client to a running `labctrl-server`, issues a
//! handful of commands over the persistent channel, and prints what comes
//! back. Not a test — there is no running server to point it at in this
//! workspace — but it exercises the same code path a real integrator
//! would.

use std::time::Duration;

use clap::Parser;
use labctrl_client::config::{AuthConfig, ClientConfig, RestfulConfig, WebsocketConfig};
use labctrl_client::{RemoteSensor, RemoteStage};
use labctrl_core::{Target, Unit};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Smoke-test driver for a running labctrl-server")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8000)]
    port: u16,
    #[arg(long, default_value = "admin")]
    username: String,
    #[arg(long, default_value = "changeme")]
    password: String,
}

fn config_for(args: &Args, device: &str) -> ClientConfig {
    ClientConfig {
        restful: RestfulConfig {
            protocol: "http://".to_string(),
            host: args.host.clone(),
            port: args.port,
            endpoint: "/".to_string(),
        },
        websocket: WebsocketConfig {
            protocol: "ws://".to_string(),
            host: args.host.clone(),
            port: args.port,
            device: device.to_string(),
        },
        authentication: AuthConfig {
            username: args.username.clone(),
            password: args.password.clone(),
            access_token: String::new(),
            token_type: "bearer".to_string(),
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "labctrl_demo=info".into()),
        )
        .init();

    let args = Args::parse();

    info!("connecting stage client");
    let stage = RemoteStage::connect(config_for(&args, "stage")).await?;
    // Channel handshake and the first state-watchdog poll race; give the
    // watchdog a moment before reading the cache.
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!(position = ?stage.position().await, "stage connected");

    let response = stage
        .set_position(Target::Physical(labctrl_core::PhysicalQuantity::new(1.5, Unit::Millimeter)))
        .await?;
    info!(?response, "set_position(1.5mm) result");

    let status = stage.rest_status().await?;
    info!(?status, "stage REST status");

    info!("connecting sensor client");
    let sensor = RemoteSensor::connect(config_for(&args, "sensor")).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let sample = sensor.get_sample().await?;
    info!(?sample, "sensor get_sample result");

    let batch = sensor.get_data_batch(5).await?;
    info!(?batch, "sensor get_data_batch(5) result");

    stage.close().await;
    sensor.close().await;
    info!("demo complete");
    Ok(())
}
