pub mod frame;
pub mod hdr;
pub mod pipeline;
pub mod source;

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use frame::{Frame, FrameUnit, Frameset};
pub use hdr::HdrMerge;
pub use pipeline::ProcessingBlock;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hdr: HdrConfig,
    pub worker: WorkerConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HdrConfig {
    /// IR at or below this is under-saturated
    pub ir_under_saturated: u8,
    /// IR at or above this is over-saturated
    pub ir_over_saturated: u8,
    /// Only pairs are supported
    pub sequence_size: i64,
    /// Drop a held id-0 frameset older than this when id 1 arrives
    pub pending_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_depth: usize,
    pub pin_core: Option<usize>, // CPU pinning for the block thread
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub with_infrared: bool,
    pub frame_limit: Option<u64>,
}

impl Default for HdrConfig {
    fn default() -> Self {
        Self {
            ir_under_saturated: 0x05,
            ir_over_saturated: 0xfa,
            sequence_size: 2,
            pending_timeout_ms: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_depth: 8,
            pin_core: None,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            fps: 30,
            with_infrared: true,
            frame_limit: Some(300),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Layer defaults, an optional TOML file and `HDR_MERGE__*` env vars
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("HDR_MERGE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let hdr = &self.hdr;
        if hdr.ir_under_saturated >= hdr.ir_over_saturated {
            return Err(ConfigError::Invalid(format!(
                "ir_under_saturated ({}) must be below ir_over_saturated ({})",
                hdr.ir_under_saturated, hdr.ir_over_saturated
            )));
        }
        if hdr.sequence_size != 2 {
            return Err(ConfigError::Invalid(format!(
                "sequence_size {} unsupported, only 2",
                hdr.sequence_size
            )));
        }
        if self.worker.queue_depth == 0 {
            return Err(ConfigError::Invalid("worker.queue_depth must be > 0".into()));
        }
        if self.source.width == 0 || self.source.height == 0 || self.source.fps == 0 {
            return Err(ConfigError::Invalid(
                "source width, height and fps must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-stage counters collected throughout the pipeline
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    pub frames_in: u64,
    pub merged: u64,
    pub merged_with_ir: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub alloc_failures: u64,
    pub stale_discards: u64,
}
