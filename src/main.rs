//! WiFi provisioning firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    use log::{error, info, warn};
    use std::time::Duration;
    use wifiweb_esp32::platform::esp32::EspBoard;
    use wifiweb_esp32::{portal, Device, DeviceConfig, StatusServer, DEFAULT_STATUS_PORT};

    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== {} starting ===", wifiweb_esp32::version_string());

    let config = DeviceConfig::with_hostname(option_env!("WIFIWEB_HOSTNAME").unwrap_or("esp32-device"));
    let peripherals = match EspBoard::peripherals(&config) {
        Ok(p) => p,
        Err(e) => {
            error!("Driver initialization failed: {}", e);
            std::thread::sleep(Duration::from_secs(2));
            // SAFETY: esp_restart has no preconditions and does not return.
            unsafe { esp_idf_sys::esp_restart() }
        }
    };

    let (handle, link) = portal::channel();
    let mut device: Device<EspBoard> = Device::new(config, peripherals);
    device.attach_portal(link);
    device.begin();

    // Keep server alive - dropped only when main returns
    let _status_server = match StatusServer::start(None, DEFAULT_STATUS_PORT, handle) {
        Ok(server) => Some(server),
        Err(e) => {
            warn!("Failed to start status server: {}", e);
            None
        }
    };

    info!("Entering main loop...");
    loop {
        device.tick();
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-device' to run the simulated device on the host.");
}
