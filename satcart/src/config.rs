use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use satcart_lib::LinkConfig;
use satcart_lib::utils::Utils;

/// Fallback values when neither the command line, the environment nor a
/// config file sets them.
pub struct Defaults;

impl Defaults {
    pub const VID: u16 = 0x0403;
    pub const PID: u16 = 0x6001;
    pub const BAUD: u32 = 1000000;
    pub const READ_TIMEOUT_MS: u64 = 100;
}

/// USB ID as written in a config file, e.g. "0x0403" or "0403".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexString(pub String);

impl HexString {
    pub fn to_u16(&self) -> Result<u16, String> {
        Utils::parse_usb_id(&self.0)
            .map_err(|e| format!("Failed to parse hex string '{}': {}", self.0, e))
    }
}

/// Root of the JSON config file. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SatcartConfig {
    #[serde(default)]
    pub vid: Option<HexString>,
    #[serde(default)]
    pub pid: Option<HexString>,
    /// Serial device path; skips the VID/PID lookup.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub console: bool,
    #[serde(default)]
    pub quiet: bool,
}

fn default_baud() -> u32 {
    Defaults::BAUD
}
fn default_read_timeout_ms() -> u64 {
    Defaults::READ_TIMEOUT_MS
}

impl SatcartConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: SatcartConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path))?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", path, e))?;
        Ok(config)
    }

    pub fn with_defaults() -> Self {
        Self {
            vid: None,
            pid: None,
            port: None,
            baud: Defaults::BAUD,
            read_timeout_ms: Defaults::READ_TIMEOUT_MS,
            console: false,
            quiet: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(vid) = &self.vid {
            vid.to_u16()?;
        }
        if let Some(pid) = &self.pid {
            pid.to_u16()?;
        }
        if self.baud == 0 {
            return Err("baud must be non-zero".to_string());
        }
        Ok(())
    }

    /// Link settings from this file alone.
    pub fn link_config(&self) -> Result<LinkConfig, String> {
        Ok(LinkConfig {
            vid: match &self.vid {
                Some(vid) => vid.to_u16()?,
                None => Defaults::VID,
            },
            pid: match &self.pid {
                Some(pid) => pid.to_u16()?,
                None => Defaults::PID,
            },
            port: self.port.clone(),
            baud: self.baud,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        })
    }
}
