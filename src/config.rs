//! TOML configuration for the furnace process.
//!
//! Every hardware pin, the tick period, PID gains and the persistence path
//! are configuration, not constants. Defaults match the reference wiring
//! (BCM numbering on a Raspberry Pi header).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub furnace: FurnaceConfig,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub pid: PidConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FurnaceConfig {
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
}

impl Default for FurnaceConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
        }
    }
}

impl FurnaceConfig {
    /// Tick period clamped to the supported range of [100, 2000] ms.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.clamp(100, 2000))
    }
}

/// GPIO assignment, BCM numbering. CLK is shared by both thermocouple
/// converters; their reads are serialized by the reader.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PinConfig {
    #[serde(default = "default_pin_heater")]
    pub heater: u8,
    #[serde(default = "default_pin_tc1_cs")]
    pub tc1_cs: u8,
    #[serde(default = "default_pin_tc1_do")]
    pub tc1_do: u8,
    #[serde(default = "default_pin_tc2_cs")]
    pub tc2_cs: u8,
    #[serde(default = "default_pin_tc2_do")]
    pub tc2_do: u8,
    #[serde(default = "default_pin_clk")]
    pub clk: u8,
    #[serde(default = "default_pin_vacuum")]
    pub vacuum: u8,
    #[serde(default = "default_pin_fan")]
    pub fan: u8,
    #[serde(default = "default_pin_door")]
    pub door: u8,
    #[serde(default = "default_pin_emergency")]
    pub emergency: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            heater: default_pin_heater(),
            tc1_cs: default_pin_tc1_cs(),
            tc1_do: default_pin_tc1_do(),
            tc2_cs: default_pin_tc2_cs(),
            tc2_do: default_pin_tc2_do(),
            clk: default_pin_clk(),
            vacuum: default_pin_vacuum(),
            fan: default_pin_fan(),
            door: default_pin_door(),
            emergency: default_pin_emergency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PidConfig {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    /// Live proportional auto-adjust. Off by default: mutating gains during
    /// control is flagged as unsafe for clinical deployments.
    #[serde(default)]
    pub autotune: bool,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            autotune: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_user_programs_path")]
    pub user_programs_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            user_programs_path: default_user_programs_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_tick_period_ms() -> u64 { 500 }
fn default_pin_heater() -> u8 { 17 }
fn default_pin_tc1_cs() -> u8 { 8 }
fn default_pin_tc1_do() -> u8 { 9 }
fn default_pin_tc2_cs() -> u8 { 7 }
fn default_pin_tc2_do() -> u8 { 10 }
fn default_pin_clk() -> u8 { 11 }
fn default_pin_vacuum() -> u8 { 27 }
fn default_pin_fan() -> u8 { 22 }
fn default_pin_door() -> u8 { 18 }
fn default_pin_emergency() -> u8 { 25 }
fn default_kp() -> f64 { 3.2 }
fn default_ki() -> f64 { 0.08 }
fn default_kd() -> f64 { 1.5 }
fn default_user_programs_path() -> String { "user_programs.json".to_string() }
fn default_bind() -> String { "0.0.0.0:8080".to_string() }

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
