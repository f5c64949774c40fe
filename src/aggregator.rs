//! One handle per channel, on either side of the process boundary
//!
//! [`CrashLogWriter`] lives in the host process and owns the writer side of
//! every enabled channel. [`CrashLogReader`] lives in the watchdog (or in the
//! host for a manual dump) and turns whatever segments it finds into a
//! [`CrashReport`].

use std::path::Path;

use chrono::{TimeZone, Utc};
use log::{debug, info, warn};

use crate::{
    channels::{
        AnimationInvocation, AnimationInvocationType, ChannelKind, ChannelReader, ChannelWriter,
        CharacterBaseConstruction, ModdedFileResolution,
    },
    config::{ChannelConfig, LogConfig},
    error::{CrashLogError, Result},
    report::{ChannelSection, CrashReport, ProcessInfo},
    segment::now_millis,
};

fn open_writer<K: ChannelKind>(
    config: &LogConfig,
    channel: &ChannelConfig,
    pid: u32,
) -> Option<ChannelWriter<K>> {
    if !channel.enabled {
        debug!("{} channel disabled", K::NAME);
        return None;
    }

    let name = config.segment_name(K::NAME, pid);
    let segment_config = ChannelWriter::<K>::segment_config(
        config.directory.as_deref(),
        name,
        channel.line_count,
        channel.line_capacity,
    );

    match ChannelWriter::<K>::open(segment_config) {
        Ok(writer) => Some(writer),
        Err(e) => {
            warn!("{} channel unavailable, its events will not be logged: {}", K::NAME, e);
            None
        }
    }
}

fn open_reader<K: ChannelKind>(directory: Option<&Path>, name: &str) -> Option<ChannelReader<K>> {
    match ChannelReader::<K>::open(directory, name) {
        Ok(reader) => Some(reader),
        Err(e @ CrashLogError::SegmentNotFound { .. }) => {
            debug!("{} channel absent: {}", K::NAME, e);
            None
        }
        Err(e) => {
            warn!("{} channel skipped: {}", K::NAME, e);
            None
        }
    }
}

fn section<K: ChannelKind>(
    reader: &Option<ChannelReader<K>>,
    crash_time_ms: i64,
) -> Option<ChannelSection<K::Event>> {
    reader.as_ref().map(|reader| ChannelSection {
        total_written: reader.total_written(),
        records: reader.read_all_descending(crash_time_ms),
    })
}

/// Writer side of all channels, owned by the host process
///
/// Every logging call is infallible: a channel that could not be opened
/// simply drops its events.
#[derive(Debug)]
pub struct CrashLogWriter {
    config: LogConfig,
    process_id: u32,
    animation: Option<ChannelWriter<AnimationInvocation>>,
    character_base: Option<ChannelWriter<CharacterBaseConstruction>>,
    modded_file: Option<ChannelWriter<ModdedFileResolution>>,
}

impl CrashLogWriter {
    /// Open every enabled channel for the current process
    ///
    /// Segments left over from an earlier session of this process id are
    /// reinitialized.
    pub fn open(config: &LogConfig) -> Self {
        Self::open_for_process(config, std::process::id())
    }

    /// Open every enabled channel under another process id
    pub fn open_for_process(config: &LogConfig, process_id: u32) -> Self {
        if let Err(e) = config.validate() {
            warn!("Crash log configuration rejected, logging disabled: {}", e);
            return Self {
                config: config.clone(),
                process_id,
                animation: None,
                character_base: None,
                modded_file: None,
            };
        }

        let writer = Self {
            config: config.clone(),
            process_id,
            animation: open_writer(config, &config.animation, process_id),
            character_base: open_writer(config, &config.character_base, process_id),
            modded_file: open_writer(config, &config.modded_file, process_id),
        };

        info!(
            "Crash logging started for process {} ({} of 3 channels)",
            process_id,
            writer.enabled_channels()
        );
        writer
    }

    /// Process id the segments are named after
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Number of channels that are actually recording
    pub fn enabled_channels(&self) -> usize {
        [
            self.animation.is_some(),
            self.character_base.is_some(),
            self.modded_file.is_some(),
        ]
        .iter()
        .filter(|open| **open)
        .count()
    }

    /// Record an animation or VFX function invocation
    pub fn log_animation(
        &self,
        actor_address: u64,
        actor_name: &[u8],
        collection_name: &str,
        invocation_type: AnimationInvocationType,
    ) {
        if let Some(channel) = &self.animation {
            channel.write_line(actor_address, actor_name, collection_name, invocation_type);
        }
    }

    /// Record the construction of a character base
    pub fn log_character_base(&self, actor_address: u64, actor_name: &[u8], collection_name: &str) {
        if let Some(channel) = &self.character_base {
            channel.write_line(actor_address, actor_name, collection_name);
        }
    }

    /// Record a redirected file load
    pub fn log_modded_file(
        &self,
        actor_address: u64,
        actor_name: &[u8],
        collection_name: &str,
        requested_file: &[u8],
        actual_file: &[u8],
    ) {
        if let Some(channel) = &self.modded_file {
            channel.write_line(
                actor_address,
                actor_name,
                collection_name,
                requested_file,
                actual_file,
            );
        }
    }

    /// Animation channel, if open
    pub fn animation(&self) -> Option<&ChannelWriter<AnimationInvocation>> {
        self.animation.as_ref()
    }

    /// Character base channel, if open
    pub fn character_base(&self) -> Option<&ChannelWriter<CharacterBaseConstruction>> {
        self.character_base.as_ref()
    }

    /// Modded file channel, if open
    pub fn modded_file(&self) -> Option<&ChannelWriter<ModdedFileResolution>> {
        self.modded_file.as_ref()
    }

    /// Dump this process's own channels, through the same path the watchdog uses
    pub fn dump(&self, info: &ProcessInfo) -> CrashReport {
        CrashLogReader::open(&self.config, self.process_id).dump(info)
    }

    /// Stop logging and remove the segment files
    pub fn close(self) -> Result<()> {
        let mut first_error = None;

        let results = [
            self.animation.as_ref().map(|c| c.segment().unlink()),
            self.character_base.as_ref().map(|c| c.segment().unlink()),
            self.modded_file.as_ref().map(|c| c.segment().unlink()),
        ];
        for result in results.into_iter().flatten() {
            if let Err(e) = result {
                warn!("Failed to remove crash log segment: {}", e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Reader side of all channels, used to produce crash reports
#[derive(Debug)]
pub struct CrashLogReader {
    process_id: u32,
    animation: Option<ChannelReader<AnimationInvocation>>,
    character_base: Option<ChannelReader<CharacterBaseConstruction>>,
    modded_file: Option<ChannelReader<ModdedFileResolution>>,
}

impl CrashLogReader {
    /// Attach to the channels of host process `process_id`
    ///
    /// Channels that are absent or written by an incompatible build are
    /// skipped; this never fails.
    pub fn open(config: &LogConfig, process_id: u32) -> Self {
        let directory = config.directory.as_deref();
        Self {
            process_id,
            animation: open_reader(
                directory,
                &config.segment_name(AnimationInvocation::NAME, process_id),
            ),
            character_base: open_reader(
                directory,
                &config.segment_name(CharacterBaseConstruction::NAME, process_id),
            ),
            modded_file: open_reader(
                directory,
                &config.segment_name(ModdedFileResolution::NAME, process_id),
            ),
        }
    }

    /// Process id whose segments were opened
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Number of channels found
    pub fn available_channels(&self) -> usize {
        [
            self.animation.is_some(),
            self.character_base.is_some(),
            self.modded_file.is_some(),
        ]
        .iter()
        .filter(|open| **open)
        .count()
    }

    /// Animation channel, if found
    pub fn animation(&self) -> Option<&ChannelReader<AnimationInvocation>> {
        self.animation.as_ref()
    }

    /// Character base channel, if found
    pub fn character_base(&self) -> Option<&ChannelReader<CharacterBaseConstruction>> {
        self.character_base.as_ref()
    }

    /// Modded file channel, if found
    pub fn modded_file(&self) -> Option<&ChannelReader<ModdedFileResolution>> {
        self.modded_file.as_ref()
    }

    /// Report with ages measured from now
    pub fn dump(&self, info: &ProcessInfo) -> CrashReport {
        self.dump_at(info, now_millis())
    }

    /// Report with ages measured from `crash_time_ms`
    pub fn dump_at(&self, info: &ProcessInfo, crash_time_ms: i64) -> CrashReport {
        let created = [
            self.animation.as_ref().map(|c| c.segment().created_at_ms()),
            self.character_base.as_ref().map(|c| c.segment().created_at_ms()),
            self.modded_file.as_ref().map(|c| c.segment().created_at_ms()),
        ];
        let elapsed_seconds = created
            .into_iter()
            .flatten()
            .min()
            .map(|start| crash_time_ms.wrapping_sub(start) as f64 / 1000.0);

        CrashReport {
            label: info.label.clone(),
            crash_time: Utc
                .timestamp_millis_opt(crash_time_ms)
                .single()
                .unwrap_or_default(),
            process_id: info.process_id,
            exit_code: info.exit_code,
            build_version: info.build_version.clone(),
            target_version: info.target_version.clone(),
            elapsed_seconds,
            animation_invocation: section(&self.animation, crash_time_ms),
            character_base_construction: section(&self.character_base, crash_time_ms),
            modded_file_resolution: section(&self.modded_file, crash_time_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_config_disables_logging() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::default()
            .with_directory(dir.path())
            .with_name_prefix("");

        let writer = CrashLogWriter::open_for_process(&config, 1);
        assert_eq!(writer.enabled_channels(), 0);
        // No-ops, never panics
        writer.log_animation(1, b"x", "y", AnimationInvocationType::PapLoad);
        writer.log_character_base(1, b"x", "y");
        writer.log_modded_file(1, b"x", "y", b"a", b"b");
    }

    #[test]
    fn test_disabled_channel_is_not_created() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::default()
            .with_directory(dir.path())
            .with_character_base(
                ChannelConfig::for_kind::<CharacterBaseConstruction>().with_enabled(false),
            );

        let writer = CrashLogWriter::open_for_process(&config, 7);
        assert_eq!(writer.enabled_channels(), 2);
        assert!(writer.character_base().is_none());
        assert!(!dir
            .path()
            .join(config.segment_name(CharacterBaseConstruction::NAME, 7))
            .exists());

        let reader = CrashLogReader::open(&config, 7);
        assert_eq!(reader.available_channels(), 2);
    }
}
