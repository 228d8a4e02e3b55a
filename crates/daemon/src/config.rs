//! Daemon configuration from environment variables

use obd_gateway_core::application::backend::obd::DEFAULT_ADAPTER_TIMEOUT_MS;
use obd_gateway_core::domain::ObdProtocol;
use obd_gateway_core::error::{AppError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ADAPTER_ADDR: &str = "192.168.0.10:35000";
const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 2000;
const DEFAULT_RPC_PORT: u16 = 9527;

/// `AT ST` counts in 4ms units up to 0xFF
const MAX_AT_TIMEOUT_MS: u32 = 255 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub adapter_addr: SocketAddr,
    /// Socket deadline for connect and each command round trip
    pub adapter_timeout: Duration,
    /// How long the adapter itself waits for the ECU (`AT ST`).
    /// Keep it below `adapter_timeout` or slow ECUs look like dead sockets.
    pub at_timeout_ms: u32,
    pub protocol: ObdProtocol,
    /// Use the canned backend instead of a real adapter
    pub mock: bool,
    pub rpc_port: u16,
    /// Open the OBD connection at startup
    pub autostart: bool,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let adapter_addr = get("OBD_GATEWAY_ADAPTER_ADDR")
            .unwrap_or_else(|| DEFAULT_ADAPTER_ADDR.to_string());
        let adapter_addr = adapter_addr.trim().parse().map_err(|e| {
            AppError::Config(format!(
                "OBD_GATEWAY_ADAPTER_ADDR '{}': {}",
                adapter_addr, e
            ))
        })?;

        let adapter_timeout_ms = match get("OBD_GATEWAY_ADAPTER_TIMEOUT_MS") {
            Some(v) => parse_number::<u64>("OBD_GATEWAY_ADAPTER_TIMEOUT_MS", &v)?,
            None => DEFAULT_SOCKET_TIMEOUT_MS,
        };
        if adapter_timeout_ms == 0 {
            return Err(AppError::Config(
                "OBD_GATEWAY_ADAPTER_TIMEOUT_MS must be positive".to_string(),
            ));
        }

        let at_timeout_ms = match get("OBD_GATEWAY_AT_TIMEOUT_MS") {
            Some(v) => parse_number::<u32>("OBD_GATEWAY_AT_TIMEOUT_MS", &v)?,
            None => DEFAULT_ADAPTER_TIMEOUT_MS,
        };
        if at_timeout_ms == 0 || at_timeout_ms > MAX_AT_TIMEOUT_MS {
            return Err(AppError::Config(format!(
                "OBD_GATEWAY_AT_TIMEOUT_MS must be between 1 and {}",
                MAX_AT_TIMEOUT_MS
            )));
        }

        let protocol = match get("OBD_GATEWAY_PROTOCOL") {
            Some(v) => v
                .parse()
                .map_err(|e| AppError::Config(format!("OBD_GATEWAY_PROTOCOL: {}", e)))?,
            None => ObdProtocol::Auto,
        };

        let rpc_port = match get("OBD_GATEWAY_RPC_PORT") {
            Some(v) => parse_number::<u16>("OBD_GATEWAY_RPC_PORT", &v)?,
            None => DEFAULT_RPC_PORT,
        };

        let log_format = match get("OBD_GATEWAY_LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "OBD_GATEWAY_LOG_FORMAT must be 'json' or 'pretty', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            adapter_addr,
            adapter_timeout: Duration::from_millis(adapter_timeout_ms),
            at_timeout_ms,
            protocol,
            mock: parse_flag("OBD_GATEWAY_MOCK", get("OBD_GATEWAY_MOCK"), false)?,
            rpc_port,
            autostart: parse_flag("OBD_GATEWAY_AUTOSTART", get("OBD_GATEWAY_AUTOSTART"), true)?,
            log_format,
            log_dir: get("OBD_GATEWAY_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{} '{}': {}", key, value, e)))
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
