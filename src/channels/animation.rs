//! Animation and VFX invocation channel
//!
//! Highest-frequency channel: small lines, many of them.
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 12 | 4 | invocation type |
//! | 16 | 8 | actor address |
//! | 24 | 64 | character name slot |
//! | 88 | rest | collection name slot |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelKind, ChannelWriter, CommonFields, NAME_SLOT_WIDTH};
use crate::codec;

const INVOCATION_TYPE_OFFSET: usize = 12;
const ACTOR_ADDRESS_OFFSET: usize = 16;
const CHARACTER_NAME_OFFSET: usize = 24;
const COLLECTION_NAME_OFFSET: usize = CHARACTER_NAME_OFFSET + NAME_SLOT_WIDTH;

/// Kinds of animation-related game functions that get logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum AnimationInvocationType {
    PapLoad = 0,
    ActionLoad = 1,
    ScheduleClipUpdate = 2,
    LoadTimelineResources = 3,
    LoadCharacterVfx = 4,
    LoadCharacterSound = 5,
    ApricotSoundPlay = 6,
    LoadAreaVfx = 7,
    CharacterBaseLoadAnimation = 8,
}

impl AnimationInvocationType {
    /// All known kinds, in discriminant order
    pub const ALL: [Self; 9] = [
        Self::PapLoad,
        Self::ActionLoad,
        Self::ScheduleClipUpdate,
        Self::LoadTimelineResources,
        Self::LoadCharacterVfx,
        Self::LoadCharacterSound,
        Self::ApricotSoundPlay,
        Self::LoadAreaVfx,
        Self::CharacterBaseLoadAnimation,
    ];

    /// Map a stored discriminant back to a kind
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::PapLoad),
            1 => Some(Self::ActionLoad),
            2 => Some(Self::ScheduleClipUpdate),
            3 => Some(Self::LoadTimelineResources),
            4 => Some(Self::LoadCharacterVfx),
            5 => Some(Self::LoadCharacterSound),
            6 => Some(Self::ApricotSoundPlay),
            7 => Some(Self::LoadAreaVfx),
            8 => Some(Self::CharacterBaseLoadAnimation),
            _ => None,
        }
    }

    /// Human-readable name used in dumps
    pub fn label(self) -> &'static str {
        match self {
            Self::PapLoad => "PAP Load",
            Self::ActionLoad => "Action Load",
            Self::ScheduleClipUpdate => "Schedule Clip Update",
            Self::LoadTimelineResources => "Load Timeline Resources",
            Self::LoadCharacterVfx => "Load Character VFX",
            Self::LoadCharacterSound => "Load Character Sound",
            Self::ApricotSoundPlay => "Apricot Sound Play",
            Self::LoadAreaVfx => "Load Area VFX",
            Self::CharacterBaseLoadAnimation => "Character Base Load Animation",
        }
    }
}

/// Label for any stored discriminant, known or not
pub fn invocation_label(raw: i32) -> String {
    match AnimationInvocationType::from_raw(raw) {
        Some(kind) => kind.label().to_string(),
        None => format!("Unknown ({})", raw),
    }
}

/// Marker type for the animation invocation channel
#[derive(Debug, Clone, Copy)]
pub struct AnimationInvocation;

/// One decoded animation invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnimationInvocationEntry {
    pub age: f64,
    pub timestamp: DateTime<Utc>,
    pub thread_id: i32,
    pub invocation_type: String,
    pub character_name: String,
    pub character_address: String,
    pub collection_name: String,
}

impl ChannelKind for AnimationInvocation {
    const NAME: &'static str = "AnimationInvocation";
    const VERSION: u32 = 1;
    const DEFAULT_LINE_COUNT: u32 = 128;
    const DEFAULT_LINE_CAPACITY: u32 = 256;
    const MIN_LINE_CAPACITY: u32 = (COLLECTION_NAME_OFFSET + 8) as u32;

    type Event = AnimationInvocationEntry;

    fn decode(line: &[u8], crash_time_ms: i64) -> AnimationInvocationEntry {
        let common = CommonFields::decode(line, crash_time_ms);
        AnimationInvocationEntry {
            age: common.age,
            timestamp: common.timestamp,
            thread_id: common.thread_id,
            invocation_type: invocation_label(codec::decode_i32(line, INVOCATION_TYPE_OFFSET)),
            character_name: codec::decode_string_lossy(line, CHARACTER_NAME_OFFSET, NAME_SLOT_WIDTH),
            character_address: codec::format_address(codec::decode_u64(line, ACTOR_ADDRESS_OFFSET)),
            collection_name: codec::decode_string_lossy(line, COLLECTION_NAME_OFFSET, line.len()),
        }
    }
}

impl ChannelWriter<AnimationInvocation> {
    /// Record one animation invocation
    pub fn write_line(
        &self,
        actor_address: u64,
        actor_name: &[u8],
        collection_name: &str,
        invocation_type: AnimationInvocationType,
    ) {
        self.write_with(|line| {
            codec::encode_i32(line, INVOCATION_TYPE_OFFSET, invocation_type as i32);
            codec::encode_u64(line, ACTOR_ADDRESS_OFFSET, actor_address);
            codec::encode_string(line, CHARACTER_NAME_OFFSET, NAME_SLOT_WIDTH, actor_name);
            let width = line.len() - COLLECTION_NAME_OFFSET;
            codec::encode_string(line, COLLECTION_NAME_OFFSET, width, collection_name.as_bytes());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_total() {
        for (raw, kind) in AnimationInvocationType::ALL.iter().enumerate() {
            assert_eq!(AnimationInvocationType::from_raw(raw as i32), Some(*kind));
            assert_eq!(*kind as i32, raw as i32);
        }
        assert_eq!(invocation_label(1), "Action Load");
        assert_eq!(invocation_label(9), "Unknown (9)");
        assert_eq!(invocation_label(-3), "Unknown (-3)");
    }

    #[test]
    fn test_decode_layout() {
        let mut line = vec![0u8; 256];
        codec::encode_i64(&mut line, 0, 10_000);
        codec::encode_i32(&mut line, 8, 12);
        codec::encode_i32(&mut line, INVOCATION_TYPE_OFFSET, 4);
        codec::encode_u64(&mut line, ACTOR_ADDRESS_OFFSET, 0x7FF6_1234_ABCD);
        codec::encode_string(&mut line, CHARACTER_NAME_OFFSET, NAME_SLOT_WIDTH, b"Foo");
        codec::encode_string(&mut line, COLLECTION_NAME_OFFSET, 256 - COLLECTION_NAME_OFFSET, b"Default");

        let entry = AnimationInvocation::decode(&line, 12_000);
        assert_eq!(entry.invocation_type, "Load Character VFX");
        assert_eq!(entry.character_name, "Foo");
        assert_eq!(entry.character_address, "7FF61234ABCD");
        assert_eq!(entry.collection_name, "Default");
        assert_eq!(entry.thread_id, 12);
        assert!((entry.age - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_kind_in_garbage_line() {
        let line = vec![0xEEu8; 256];
        let entry = AnimationInvocation::decode(&line, 0);
        assert!(entry.invocation_type.starts_with("Unknown ("));
        assert_eq!(entry.character_name.chars().count(), NAME_SLOT_WIDTH - 2);
    }
}
