mod auth;
mod config;
mod device;
mod http;
mod persistence;
mod state;
mod subscriptions;
mod transport;
mod update_bus;
mod ws;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use auth::AuthEngine;
use config::{AccessLevel, AuthConfig, CorsConfig, HardwareConfig, JwtConfig, ServerConfig, UserConfig};
use device::sensor::SensorSession;
use device::DeviceSession;
use state::{DeviceState, SessionState, StateStore};
use subscriptions::SubscriptionManager;
use transport::mock::MockTransport;
use update_bus::{UpdateBus, DEFAULT_CAPACITY};

/// Shared application state handed to every HTTP and WS handler.
pub struct AppState {
    pub auth: Arc<AuthEngine>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub stage: Arc<DeviceSession<MockTransport>>,
    pub sensor: Arc<SensorSession<MockTransport>>,
}

#[derive(Parser, Debug)]
#[command(about = "Shared-device laboratory instrument session server")]
struct Args {
    #[arg(long, default_value = "hardware_config.json")]
    hardware_config: PathBuf,
    #[arg(long, default_value = "server_config.json")]
    server_config: PathBuf,
    #[arg(long)]
    port: Option<u16>,
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        auth: AuthConfig {
            users: vec![UserConfig {
                username: "admin".to_string(),
                // argon2id hash of "changeme" — replace before deploying.
                password_hash:
                    "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHRzYWx0$Y2hhbmdlbWVjaGFuZ2VtZWNoYW5nZW0"
                        .to_string(),
                access_level: AccessLevel::Advanced,
            }],
            jwt: JwtConfig {
                secret: "development-only-secret-change-me".to_string(),
                expiry_seconds: 3600,
            },
        },
        cors: CorsConfig {
            allowed_origins: vec!["*".to_string()],
        },
        port: 8000,
    }
}

fn default_hardware_config() -> HardwareConfig {
    use labctrl_core::{ParameterSpec, PhysicalQuantity, Unit};
    use std::collections::HashMap;

    let mut devices = HashMap::new();

    let mut stage_params = HashMap::new();
    stage_params.insert(
        "position".to_string(),
        ParameterSpec::new(PhysicalQuantity::new(10.0, Unit::Micrometer), 0, 0, -1_000_000, 1_000_000)
            .expect("default stage position spec is valid"),
    );
    stage_params.insert(
        "velocity".to_string(),
        ParameterSpec::new(PhysicalQuantity::new(1.0, Unit::MicrometerPerSecond), 1000, 1000, 1, 50_000)
            .expect("default stage velocity spec is valid"),
    );
    stage_params.insert(
        "acceleration".to_string(),
        ParameterSpec::new(PhysicalQuantity::new(1.0, Unit::MicrometerPerSecondSquared), 1000, 1000, 1, 50_000)
            .expect("default stage acceleration spec is valid"),
    );
    devices.insert(
        "stage".to_string(),
        config::DeviceHardwareConfig {
            serial: config::SerialConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 115200,
                timeout_ms: 1000,
            },
            parameters: stage_params,
        },
    );

    let mut sensor_params = HashMap::new();
    sensor_params.insert(
        "value".to_string(),
        ParameterSpec::new(PhysicalQuantity::new(0.01, Unit::Celsius), 0, 0, -10_000, 10_000)
            .expect("default sensor value spec is valid"),
    );
    devices.insert(
        "sensor".to_string(),
        config::DeviceHardwareConfig {
            serial: config::SerialConfig {
                port: "/dev/ttyUSB1".to_string(),
                baud_rate: 115200,
                timeout_ms: 1000,
            },
            parameters: sensor_params,
        },
    );

    HardwareConfig { devices }
}

/// Rebuilds a `HardwareConfig` carrying the live parameter values out of
/// `store`, so a shutdown save persists what the instruments were actually
/// set to rather than the values the server started with.
async fn snapshot_hardware_config(hardware: &HardwareConfig, store: &StateStore) -> HardwareConfig {
    let mut snapshot = hardware.clone();
    for (name, device_config) in snapshot.devices.iter_mut() {
        let Some(state) = store.get(name) else {
            continue;
        };
        let state = state.read().await;
        for (param_name, spec) in device_config.parameters.iter_mut() {
            if let Some(live) = state.parameter(param_name) {
                spec.value = live.value;
            }
        }
    }
    snapshot
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labctrl_server=info".into()),
        )
        .init();

    let args = Args::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "labctrl-server starting");

    let hardware = HardwareConfig::load_or_default(&args.hardware_config);
    let hardware = if hardware.devices.is_empty() {
        default_hardware_config()
    } else {
        hardware
    };
    let server_config = ServerConfig::load(&args.server_config).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "failed to load server config, using defaults");
        default_server_config()
    });

    let auth = AuthEngine::new(server_config.clone());

    let mut store = StateStore::new();
    for (name, device_config) in &hardware.devices {
        store.insert(DeviceState::new(name.clone(), device_config.parameters.clone()));
    }

    let stage_timeout = hardware
        .devices
        .get("stage")
        .map(|d| Duration::from_millis(d.serial.timeout_ms))
        .unwrap_or(Duration::from_secs(1));
    let sensor_timeout = hardware
        .devices
        .get("sensor")
        .map(|d| Duration::from_millis(d.serial.timeout_ms))
        .unwrap_or(Duration::from_secs(1));

    let stage_state = store.get("stage").expect("hardware config defines a stage device");
    let (stage_bus, mut stage_rx) = UpdateBus::new("stage", DEFAULT_CAPACITY);
    let stage_session = Arc::new(DeviceSession::new(
        "stage",
        stage_state,
        MockTransport::line_protocol_stage(0),
        stage_bus,
        stage_timeout,
    ));
    stage_session.set_session_state(SessionState::Idle).await;

    let sensor_state = store.get("sensor").expect("hardware config defines a sensor device");
    let (sensor_bus, mut sensor_rx) = UpdateBus::new("sensor", DEFAULT_CAPACITY);
    let sensor_session = Arc::new(SensorSession::new(DeviceSession::new(
        "sensor",
        sensor_state,
        MockTransport::cbor_protocol_sensor(0),
        sensor_bus,
        sensor_timeout,
    )));
    sensor_session.inner.set_session_state(SessionState::Idle).await;

    let subscriptions = Arc::new(SubscriptionManager::new());

    let fanout_subs = subscriptions.clone();
    tokio::spawn(async move {
        while let Some(event) = stage_rx.recv().await {
            fanout_subs.broadcast(event).await;
        }
    });
    let fanout_subs = subscriptions.clone();
    tokio::spawn(async move {
        while let Some(event) = sensor_rx.recv().await {
            fanout_subs.broadcast(event).await;
        }
    });

    let state = Arc::new(AppState {
        auth,
        subscriptions,
        stage: stage_session,
        sensor: sensor_session,
    });

    let cors = if server_config.cors.allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = server_config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = http::build_router(cors)
        .route("/ws", get(ws::ws_route))
        .with_state(state);

    let port = args.port.unwrap_or(server_config.port);
    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server loop exited with an error");

    info!("persisting configuration before exit");
    let live_hardware = snapshot_hardware_config(&hardware, &store).await;
    if let Err(err) = live_hardware.save(&args.hardware_config) {
        tracing::error!(error = %err, "failed to save hardware config on shutdown");
    }
    if let Err(err) = server_config.save(&args.server_config) {
        tracing::error!(error = %err, "failed to save server config on shutdown");
    }
}
