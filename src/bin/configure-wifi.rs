//! WiFi configuration utility for ESP32.
//!
//! Stores credentials to NVS with a fresh boot-attempt budget, exactly as the
//! configuration portal would.
//!
//! Usage:
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo configure-wifi
//!
//! For open networks (no password):
//!   WIFI_SSID="OpenNetwork" WIFI_PASSWORD="" cargo configure-wifi

/// WiFi SSID - set via WIFI_SSID environment variable at compile time.
#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// WiFi password - set via WIFI_PASSWORD environment variable at compile time.
/// Empty string for open networks.
#[cfg(feature = "esp32")]
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

/// Print error message and halt. On ESP32, we pause briefly then return
/// so the process terminates cleanly (espflash monitor will show the output).
#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn main() {
    use wifiweb_esp32::config::NetworkIdentity;
    use wifiweb_esp32::store::NvsStore;
    use wifiweb_esp32::ConfigStore;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== WiFi Configuration Utility ===\n");

    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => {
            halt_with_error(
                "Error: WIFI_SSID environment variable not set at compile time.\n\n\
                 Usage:\n  \
                 WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo configure-wifi",
            );
        }
    };
    let password = WIFI_PASSWORD.unwrap_or("");

    println!("SSID: {}", ssid);
    println!(
        "Password: {} ({} chars)",
        if password.is_empty() { "(none)" } else { "****" },
        password.len()
    );

    let identity = match NetworkIdentity::new(ssid, password) {
        Ok(identity) => identity,
        Err(e) => halt_with_error(&format!("Error: {}", e)),
    };

    let mut store = match NvsStore::take() {
        Ok(backend) => ConfigStore::new(backend),
        Err(e) => halt_with_error(&format!("Error initializing NVS: {}", e)),
    };

    let mut record = match store.load() {
        Ok(record) => record,
        Err(e) => halt_with_error(&format!("Error reading NVS: {}", e)),
    };
    record.network = identity;
    record.boot_attempts = 0;

    if let Err(e) = store.save_network(&record) {
        halt_with_error(&format!("Error saving to NVS: {}", e));
    }

    println!("\n=== WiFi configuration saved to NVS ===");
    println!("Hostname, addressing and power settings were left unchanged.");
    println!("\n=== Done - you can disconnect the device ===\n");

    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo configure-wifi");
    std::process::exit(1);
}
