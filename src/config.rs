//! Configuration for the set of crash log channels

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    channels::{AnimationInvocation, ChannelKind, CharacterBaseConstruction, ModdedFileResolution},
    error::{CrashLogError, Result},
    memory::default_shm_dir,
    segment::SegmentLayout,
};

/// Prefix of every segment name unless configured otherwise
pub const DEFAULT_NAME_PREFIX: &str = "crashring";

/// Size and switch for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Whether the host opens this channel at all
    pub enabled: bool,
    /// Number of lines kept
    pub line_count: u32,
    /// Bytes per line
    pub line_capacity: u32,
}

impl ChannelConfig {
    /// Default dimensions of a channel kind
    pub fn for_kind<K: ChannelKind>() -> Self {
        Self {
            enabled: true,
            line_count: K::DEFAULT_LINE_COUNT,
            line_capacity: K::DEFAULT_LINE_CAPACITY,
        }
    }

    /// Set the dimensions
    pub fn with_lines(mut self, line_count: u32, line_capacity: u32) -> Self {
        self.line_count = line_count;
        self.line_capacity = line_capacity;
        self
    }

    /// Set whether the channel is enabled
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate the dimensions against a channel kind
    pub fn validate_for<K: ChannelKind>(&self) -> Result<()> {
        SegmentLayout::new(K::VERSION, self.line_count, self.line_capacity).validate()?;
        if self.line_capacity < K::MIN_LINE_CAPACITY {
            return Err(CrashLogError::invalid_parameter(
                "line_capacity",
                format!("{} lines need at least {} bytes", K::NAME, K::MIN_LINE_CAPACITY),
            ));
        }
        Ok(())
    }
}

/// Configuration shared by the host and the watchdog
///
/// Both sides must agree on `directory` and `name_prefix` to find each
/// other's segments; dimensions only matter to the writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory holding the segment files (default: `default_shm_dir()`)
    pub directory: Option<PathBuf>,
    /// First component of every segment name
    pub name_prefix: String,
    pub animation: ChannelConfig,
    pub character_base: ChannelConfig,
    pub modded_file: ChannelConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            animation: ChannelConfig::for_kind::<AnimationInvocation>(),
            character_base: ChannelConfig::for_kind::<CharacterBaseConstruction>(),
            modded_file: ChannelConfig::for_kind::<ModdedFileResolution>(),
        }
    }
}

impl LogConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CrashLogError::from_io(e, "Failed to read configuration"))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the directory holding the segment files
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the segment name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Set the animation channel configuration
    pub fn with_animation(mut self, channel: ChannelConfig) -> Self {
        self.animation = channel;
        self
    }

    /// Set the character base channel configuration
    pub fn with_character_base(mut self, channel: ChannelConfig) -> Self {
        self.character_base = channel;
        self
    }

    /// Set the modded file channel configuration
    pub fn with_modded_file(mut self, channel: ChannelConfig) -> Self {
        self.modded_file = channel;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name_prefix.is_empty() {
            return Err(CrashLogError::invalid_parameter(
                "name_prefix",
                "Segment name prefix cannot be empty",
            ));
        }
        if self.name_prefix.contains(['/', '\\', '\0']) {
            return Err(CrashLogError::invalid_parameter(
                "name_prefix",
                "Segment name prefix must be a plain file name",
            ));
        }

        if self.animation.enabled {
            self.animation.validate_for::<AnimationInvocation>()?;
        }
        if self.character_base.enabled {
            self.character_base.validate_for::<CharacterBaseConstruction>()?;
        }
        if self.modded_file.enabled {
            self.modded_file.validate_for::<ModdedFileResolution>()?;
        }
        Ok(())
    }

    /// Segment name of a channel for the host process `pid`
    pub fn segment_name(&self, channel: &str, pid: u32) -> String {
        format!("{}.{}.{}", self.name_prefix, channel, pid)
    }

    /// Directory actually used for segment files
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_shm_dir)
    }
}
