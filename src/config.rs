//! Index construction parameters.
//!
//! `IndexConfig` holds the knobs the gzip seek index is built with. They trade
//! memory for seek speed and have no effect on the bytes a read returns. A
//! handle uses one configuration for its whole lifetime.
//!
//! With the `config` feature enabled the configuration can also be loaded from a
//! TOML file, by default `<config dir>/igzread/config.toml`.

use crate::error::{IgzError, Result};

/// Largest back-reference distance allowed by DEFLATE (RFC 1951)
pub const DEFLATE_WINDOW: usize = 32 * 1024;

/// Smallest read buffer the index accepts
pub const MIN_READBUF_SIZE: usize = 128;

/// When checkpoints are added to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "config", serde(rename_all = "lowercase"))]
pub enum BuildMode {
    /// Record checkpoints whenever decoding reaches data not yet indexed
    #[default]
    Auto,
    /// Only `build_full_index` records checkpoints; seeks past the built
    /// coverage are refused
    Manual,
}

/// Parameters for the gzip seek index
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct IndexConfig {
    /// Minimum distance, in uncompressed bytes, between two checkpoints
    pub spacing: u64,
    /// Bytes of preceding output stored with every checkpoint
    pub window_size: usize,
    /// Size of the buffer compressed data is read through
    pub readbuf_size: usize,
    /// When checkpoints are recorded
    pub build_mode: BuildMode,
    /// Verify CRC-32 and length trailers of members decoded from their start
    pub verify_checksums: bool,
    /// Keep checkpoint windows deflate-compressed in memory
    pub compress_windows: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            spacing: 4 * 1024 * 1024,
            window_size: DEFLATE_WINDOW,
            readbuf_size: 1024 * 1024,
            build_mode: BuildMode::Auto,
            verify_checksums: true,
            compress_windows: true,
        }
    }
}

impl IndexConfig {
    /// Check that the parameters can produce a working index
    ///
    /// # Rules
    /// - `window_size` must cover the full DEFLATE window (32 KiB)
    /// - `spacing` must be larger than `window_size`
    /// - `readbuf_size` must be at least 128 bytes
    pub fn validate(&self) -> Result<()> {
        if self.window_size < DEFLATE_WINDOW {
            return Err(IgzError::config(format!(
                "window_size must be at least {} bytes, got {}",
                DEFLATE_WINDOW, self.window_size
            )));
        }

        if self.spacing <= self.window_size as u64 {
            return Err(IgzError::config(format!(
                "spacing ({}) must be larger than window_size ({})",
                self.spacing, self.window_size
            )));
        }

        if self.readbuf_size < MIN_READBUF_SIZE {
            return Err(IgzError::config(format!(
                "readbuf_size must be at least {} bytes, got {}",
                MIN_READBUF_SIZE, self.readbuf_size
            )));
        }

        Ok(())
    }

    /// Builder-style setter for `spacing`
    pub fn with_spacing(mut self, spacing: u64) -> Self {
        self.spacing = spacing;
        self
    }

    /// Builder-style setter for `build_mode`
    pub fn with_build_mode(mut self, build_mode: BuildMode) -> Self {
        self.build_mode = build_mode;
        self
    }

    /// Builder-style setter for `readbuf_size`
    pub fn with_readbuf_size(mut self, readbuf_size: usize) -> Self {
        self.readbuf_size = readbuf_size;
        self
    }
}

#[cfg(feature = "config")]
impl IndexConfig {
    /// Parse a configuration from TOML text; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| IgzError::config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IgzError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Default configuration file location, if the platform has a config directory
    pub fn default_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|dir| dir.join("igzread").join("config.toml"))
    }

    /// Load the default configuration file, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}
