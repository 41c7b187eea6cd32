//! Host-side TOML configuration: board capability profile, default
//! transport record, and bridge settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSection,

    #[serde(default)]
    pub board: BoardProfile,

    #[serde(default)]
    pub transport: TransportDefaults,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path of the NvMem image file; omit for a volatile in-memory image.
    #[serde(default)]
    pub nvmem_image: Option<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            nvmem_image: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Board capability facts the pin descriptor table is built from.
/// Defaults describe a classic Uno-style layout: 14 digital pins, 6
/// analog inputs, PWM on a handful of pins, two external interrupts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoardProfile {
    #[serde(default = "default_pin_count")]
    pub pin_count: u8,

    #[serde(default = "default_analog_pins")]
    pub analog_pins: Vec<u8>,

    #[serde(default = "default_pwm_pins")]
    pub pwm_pins: Vec<u8>,

    #[serde(default = "default_interrupt_pins")]
    pub interrupt_pins: Vec<u8>,

    /// Pins never exposed to remote mode changes (e.g. UART lines).
    #[serde(default)]
    pub reserved_pins: Vec<u8>,

    /// Sampled at startup; low forces the hard-coded default transport
    /// for that boot without touching the store.
    #[serde(default)]
    pub defaults_pin: Option<u8>,

    /// Add jitter to simulated analog reads.
    #[serde(default)]
    pub analog_noise: bool,
}

impl Default for BoardProfile {
    fn default() -> Self {
        Self {
            pin_count: default_pin_count(),
            analog_pins: default_analog_pins(),
            pwm_pins: default_pwm_pins(),
            interrupt_pins: default_interrupt_pins(),
            reserved_pins: Vec::new(),
            defaults_pin: None,
            analog_noise: false,
        }
    }
}

/// Hard-coded fallback transport record, used when the store is
/// uninitialized or bypassed by the power-on defaults pin.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportDefaults {
    #[serde(default = "default_transport_kind")]
    pub kind: u8,

    #[serde(default = "default_transport_params")]
    pub params: String,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            params: default_transport_params(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:5555".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5
}

fn default_pin_count() -> u8 {
    20
}

fn default_analog_pins() -> Vec<u8> {
    (14..20).collect()
}

fn default_pwm_pins() -> Vec<u8> {
    vec![3, 5, 6, 9, 10, 11]
}

fn default_interrupt_pins() -> Vec<u8> {
    vec![2, 3]
}

fn default_transport_kind() -> u8 {
    2 // ethernet
}

fn default_transport_params() -> String {
    "0.0.0.0:5555".to_string()
}

pub fn load_config(path: impl AsRef<Path>) -> Result<HostConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}
