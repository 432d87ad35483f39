//! JSON status and control endpoint.
//!
//! Uses `tiny_http`, which works on both host and ESP32 (via std::net).
//! Control requests are validated here and queued; the device loop applies
//! them on its next tick, so every control call answers `202 Accepted`.
//!
//! | Method | Path | Action |
//! |---|---|---|
//! | GET | `/status` | current [`DeviceStatus`](super::DeviceStatus) |
//! | GET | `/networks` | results of the last scan |
//! | POST | `/scan` | queue a scan |
//! | POST | `/config` | queue a [`ConfigUpdate`] (JSON body) |
//! | POST | `/reset/network` | queue a network-only reset |
//! | POST | `/reset/factory` | queue a factory reset |

use super::{PortalHandle, PortalRequest};
use crate::config::ConfigUpdate;
use crate::gesture::ResetTier;
use log::{error, info, warn};
use serde_json::json;
use std::io::Read;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

/// Default port for the status server.
pub const DEFAULT_STATUS_PORT: u16 = 8080;

/// Largest accepted request body.
const MAX_BODY_LEN: u64 = 4096;

/// Response produced by [`route`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string(),
        }
    }

    fn error(status: u16, message: impl std::fmt::Display) -> Self {
        Self::json(status, json!({ "error": message.to_string() }))
    }

    fn accepted() -> Self {
        Self::json(202, json!({ "accepted": true }))
    }
}

/// HTTP status server.
///
/// Runs in a background thread. Drop it to stop the server.
pub struct StatusServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl StatusServer {
    /// Start serving on `bind_addr:port` (`None` binds 0.0.0.0).
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        portal: PortalHandle,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;

        info!("Status server listening on http://{}/status", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::spawn(move || {
            Self::run_server(server, portal, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }

    fn run_server(server: Server, portal: PortalHandle, shutdown: Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Status server shutting down");
                break;
            }

            match server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => Self::handle_request(request, &portal),
                Ok(None) => {}
                Err(e) => {
                    error!("Server error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_request(mut request: Request, portal: &PortalHandle) {
        let mut body = String::new();
        if let Err(e) = request
            .as_reader()
            .take(MAX_BODY_LEN)
            .read_to_string(&mut body)
        {
            warn!("Failed to read request body: {}", e);
            body.clear();
        }

        let reply = route(request.method(), request.url(), &body, portal);
        let mut response = Response::from_string(reply.body).with_status_code(reply.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            response = response.with_header(header);
        }
        if let Err(e) = request.respond(response) {
            warn!("Failed to send response: {}", e);
        }
    }

    /// Stop the server.
    ///
    /// May take up to 100ms due to the polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map one request to a reply, queueing control requests on `portal`.
pub(crate) fn route(method: &Method, url: &str, body: &str, portal: &PortalHandle) -> Reply {
    let path = url.split('?').next().unwrap_or(url).trim_end_matches('/');

    let (expected, request) = match path {
        "" => return Reply::json(200, json!({ "see": "/status" })),
        "/status" => {
            if method != &Method::Get {
                return Reply::error(405, "use GET");
            }
            return match portal.shared().status() {
                Some(status) => match serde_json::to_value(status) {
                    Ok(value) => Reply::json(200, value),
                    Err(e) => Reply::error(500, e),
                },
                None => Reply::error(503, "device starting"),
            };
        }
        "/networks" => {
            if method != &Method::Get {
                return Reply::error(405, "use GET");
            }
            return match serde_json::to_value(portal.shared().networks()) {
                Ok(value) => Reply::json(200, value),
                Err(e) => Reply::error(500, e),
            };
        }
        "/scan" => (Method::Post, Ok(PortalRequest::Scan)),
        "/reset/network" => (Method::Post, Ok(PortalRequest::Reset(ResetTier::NetworkOnly))),
        "/reset/factory" => (Method::Post, Ok(PortalRequest::Reset(ResetTier::Factory))),
        "/config" => (Method::Post, parse_update(body)),
        _ => return Reply::error(404, "not found"),
    };

    if method != &expected {
        return Reply::error(405, "use POST");
    }
    let request = match request {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    match portal.submit(request) {
        Ok(()) => Reply::accepted(),
        Err(e) => Reply::error(503, e),
    }
}

fn parse_update(body: &str) -> Result<PortalRequest, Reply> {
    let update: ConfigUpdate =
        serde_json::from_str(body).map_err(|e| Reply::error(400, format!("bad JSON: {}", e)))?;
    update.validate().map_err(|e| Reply::error(400, e))?;
    Ok(PortalRequest::Reconfigure(update))
}

#[cfg(test)]
mod tests {
    use super::super::{channel, DeviceStatus};
    use super::*;

    // ==================== Routing Tests ====================

    #[test]
    fn test_status_before_publish() {
        let (handle, _link) = channel();
        let reply = route(&Method::Get, "/status", "", &handle);
        assert_eq!(reply.status, 503);
    }

    #[test]
    fn test_reset_is_queued() {
        let (handle, link) = channel();

        let reply = route(&Method::Post, "/reset/factory", "", &handle);

        assert_eq!(reply.status, 202);
        assert!(matches!(
            link.next_request(),
            Some(PortalRequest::Reset(ResetTier::Factory))
        ));
    }

    #[test]
    fn test_wrong_method() {
        let (handle, link) = channel();
        assert_eq!(route(&Method::Get, "/reset/network", "", &handle).status, 405);
        assert_eq!(route(&Method::Post, "/status", "", &handle).status, 405);
        assert!(link.next_request().is_none());
    }

    #[test]
    fn test_config_is_validated_before_queueing() {
        let (handle, link) = channel();

        let reply = route(&Method::Post, "/config", r#"{"network":{"ssid":""}}"#, &handle);
        assert_eq!(reply.status, 400);
        assert!(link.next_request().is_none());

        let reply = route(&Method::Post, "/config", "not json", &handle);
        assert_eq!(reply.status, 400);

        let body = r#"{"network":{"ssid":"Home","password":"pass"}}"#;
        let reply = route(&Method::Post, "/config", body, &handle);
        assert_eq!(reply.status, 202);
        assert!(matches!(
            link.next_request(),
            Some(PortalRequest::Reconfigure(_))
        ));
    }

    #[test]
    fn test_unknown_path() {
        let (handle, _link) = channel();
        assert_eq!(route(&Method::Get, "/nope", "", &handle).status, 404);
    }

    #[test]
    fn test_status_is_json() {
        use crate::controller::ConnectionState;
        use crate::power::{WakeCause, WakeupStats};

        let (handle, link) = channel();
        link.shared().publish_status(DeviceStatus {
            version: "test".to_string(),
            role: None,
            state: ConnectionState::Idle,
            ap_reason: None,
            boot_attempts: 1,
            max_attempts: 3,
            hostname: "node".to_string(),
            ssid: String::new(),
            address: None,
            static_address: false,
            time_sync: false,
            sleep_enabled: false,
            wake_interval_us: 1,
            wake_logging: false,
            last_wake: WakeCause::Undefined,
            wake_stats: WakeupStats::default(),
            reboot_pending: false,
            debug_mode: false,
        });

        let reply = route(&Method::Get, "/status/", "", &handle);

        assert_eq!(reply.status, 200);
        let value: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(value["boot_attempts"], 1);
        assert_eq!(value["hostname"], "node");
    }
}
