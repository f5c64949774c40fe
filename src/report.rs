//! Crash report produced from the channels

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    channels::{AnimationInvocationEntry, CharacterBaseEntry, ModdedFileEntry},
    error::{CrashLogError, Result},
};

/// Facts about the host process supplied by whoever produces the dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Why the dump was taken ("Crash", "Manual", ...)
    pub label: String,
    pub process_id: u32,
    pub exit_code: i32,
    pub build_version: String,
    pub target_version: String,
}

impl ProcessInfo {
    /// Create process info with empty version strings
    pub fn new(label: impl Into<String>, process_id: u32) -> Self {
        Self {
            label: label.into(),
            process_id,
            exit_code: 0,
            build_version: String::new(),
            target_version: String::new(),
        }
    }

    /// Set the host's exit code
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Set the version of the logging build and of the host it runs in
    pub fn with_versions(
        mut self,
        build_version: impl Into<String>,
        target_version: impl Into<String>,
    ) -> Self {
        self.build_version = build_version.into();
        self.target_version = target_version.into();
        self
    }
}

/// Records of one channel, most recent first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelSection<T> {
    /// Lines ever written to the channel, including overwritten ones
    pub total_written: u64,
    pub records: Vec<T>,
}

/// Snapshot of every available channel at crash time
///
/// Channels whose segment was absent or incompatible are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CrashReport {
    pub label: String,
    pub crash_time: DateTime<Utc>,
    pub process_id: u32,
    pub exit_code: i32,
    pub build_version: String,
    pub target_version: String,
    /// Seconds between the oldest segment's creation and the crash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_invocation: Option<ChannelSection<AnimationInvocationEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_base_construction: Option<ChannelSection<CharacterBaseEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modded_file_resolution: Option<ChannelSection<ModdedFileEntry>>,
}

impl CrashReport {
    /// Number of channels present in the report
    pub fn channel_count(&self) -> usize {
        [
            self.animation_invocation.is_some(),
            self.character_base_construction.is_some(),
            self.modded_file_resolution.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a report back from JSON
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Write the report as JSON to `path`
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json_pretty()?;
        std::fs::write(path.as_ref(), json)
            .map_err(|e| CrashLogError::from_io(e, "Failed to write crash report"))
    }
}
