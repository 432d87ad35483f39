//! Simulated device for development on the host.
//!
//! Runs the full provisioning logic against a JSON settings file and a
//! simulated radio, with the status endpoint at
//! http://localhost:8080/status.
//!
//! # Usage
//!
//! ```bash
//! WIFIWEB_REACHABLE="Home:hunter22" cargo run --bin host-device
//! curl -X POST localhost:8080/config -d '{"network":{"ssid":"Home","password":"hunter22"}}'
//! ```
//!
//! Environment:
//! - `WIFIWEB_REACHABLE` - simulated networks, `ssid:password,...`
//! - `WIFIWEB_STORE` - settings file (default `~/.wifiweb-esp32/store.json`)
//! - `WIFIWEB_STATUS_PORT` - status server port (default 8080)
//! - `WIFIWEB_HOSTNAME` - default hostname
//!
//! A restart exits with code 3; wrap the binary in a loop to relaunch.

use log::{error, info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wifiweb_esp32::platform::host::HostBoard;
use wifiweb_esp32::{portal, Device, DeviceConfig, StatusServer, DEFAULT_STATUS_PORT};

/// Pause between scheduler iterations.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== {} (host) starting ===", wifiweb_esp32::version_string());

    let store_path = std::env::var_os("WIFIWEB_STORE").map(PathBuf::from);
    let port = match std::env::var("WIFIWEB_STATUS_PORT") {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid WIFIWEB_STATUS_PORT {:?}", value);
            DEFAULT_STATUS_PORT
        }),
        Err(_) => DEFAULT_STATUS_PORT,
    };
    let hostname = std::env::var("WIFIWEB_HOSTNAME").unwrap_or_else(|_| "host-device".to_string());

    let peripherals = match HostBoard::peripherals(store_path.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to open settings: {}", e);
            std::process::exit(1);
        }
    };

    let (handle, link) = portal::channel();

    // Keep server alive - variable intentionally unused except for Drop
    let _status_server = match StatusServer::start(None, port, handle) {
        Ok(server) => {
            info!("Status server running at http://localhost:{}/status", port);
            Some(server)
        }
        Err(e) => {
            warn!("Failed to start status server: {}", e);
            warn!("Continuing without status server");
            None
        }
    };

    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let device_thread = thread::spawn(move || {
        let mut device: Device<HostBoard> = Device::new(DeviceConfig::with_hostname(hostname), peripherals);
        device.attach_portal(link);
        device.begin();

        while !loop_cancel.is_cancelled() {
            device.tick();
            thread::sleep(TICK_INTERVAL);
        }
        info!("Device loop stopped");
    });

    info!("Entering main loop (Ctrl+C to exit)...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutting down");
    cancel.cancel();

    if device_thread.join().is_err() {
        error!("Device loop panicked");
    }
}
