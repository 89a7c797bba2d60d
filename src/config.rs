use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolver::ResolverConfig;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive finite number, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        min: usize,
        value: usize,
    },
}

pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse settings in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.filters.pose.validate()?;
        self.filters.hand.validate()?;
        self.filters.face.validate()?;
        self.resolver.validate()?;
        if self.preview.width == 0 || self.preview.height == 0 {
            return Err(ConfigError::TooSmall {
                name: "preview size",
                min: 1,
                value: 0,
            });
        }
        if self.runtime.source_cache_len == 0 {
            return Err(ConfigError::TooSmall {
                name: "source_cache_len",
                min: 1,
                value: 0,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    #[serde(default = "default_sender_host")]
    pub host: String,
    #[serde(default = "default_sender_port")]
    pub port: u16,
}

fn default_sender_host() -> String {
    "127.0.0.1".to_string()
}
fn default_sender_port() -> u16 {
    9000
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: default_sender_host(),
            port: default_sender_port(),
        }
    }
}

impl SenderConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_control_port() -> u16 {
    50051
}
fn default_true() -> bool {
    true
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            port: default_control_port(),
            enabled: true,
        }
    }
}

/// Smoothing strategy for one stream category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    OneEuro {
        min_cutoff: f32,
        slope: f32,
        d_cutoff: f32,
    },
    Exponential {
        smoothing_factor: f32,
    },
    Gaussian {
        sigma: f32,
        window_size: usize,
    },
    None,
}

impl FilterSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            FilterSpec::OneEuro {
                min_cutoff,
                slope,
                d_cutoff,
            } => {
                ensure_positive("min_cutoff", min_cutoff as f64)?;
                ensure_positive("slope", slope as f64)?;
                ensure_positive("d_cutoff", d_cutoff as f64)
            }
            FilterSpec::Exponential { smoothing_factor } => {
                ensure_positive("smoothing_factor", smoothing_factor as f64)
            }
            FilterSpec::Gaussian { sigma, window_size } => {
                ensure_positive("sigma", sigma as f64)?;
                if window_size < 1 {
                    return Err(ConfigError::TooSmall {
                        name: "window_size",
                        min: 1,
                        value: window_size,
                    });
                }
                Ok(())
            }
            FilterSpec::None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiltersConfig {
    #[serde(default = "default_pose_filter")]
    pub pose: FilterSpec,
    #[serde(default = "default_part_filter")]
    pub hand: FilterSpec,
    #[serde(default = "default_part_filter")]
    pub face: FilterSpec,
}

fn default_pose_filter() -> FilterSpec {
    FilterSpec::OneEuro {
        min_cutoff: 0.08,
        slope: 0.5,
        d_cutoff: 1.0,
    }
}

fn default_part_filter() -> FilterSpec {
    FilterSpec::OneEuro {
        min_cutoff: 1.0,
        slope: 1.0,
        d_cutoff: 1.0,
    }
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            pose: default_pose_filter(),
            hand: default_part_filter(),
            face: default_part_filter(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_preview_width")]
    pub width: u32,
    #[serde(default = "default_preview_height")]
    pub height: u32,
}

fn default_preview_width() -> u32 {
    1280
}
fn default_preview_height() -> u32 {
    720
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: default_preview_width(),
            height: default_preview_height(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_source_cache_len")]
    pub source_cache_len: usize,
}

fn default_frame_interval_ms() -> u64 {
    16
}
fn default_source_cache_len() -> usize {
    2
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            source_cache_len: default_source_cache_len(),
        }
    }
}
