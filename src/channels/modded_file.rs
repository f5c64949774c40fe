//! Modded file resolution channel
//!
//! Widest records: two file paths per line, split evenly over the space left
//! after the fixed fields.
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 12 | 8 | actor address |
//! | 20 | 64 | character name slot |
//! | 84 | 64 | collection name slot |
//! | 148 | (capacity - 148) / 2 | requested file slot |
//! | ... | rest | actual file slot |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelKind, ChannelWriter, CommonFields, COMMON_FIELDS_END, NAME_SLOT_WIDTH};
use crate::codec;

const ACTOR_ADDRESS_OFFSET: usize = COMMON_FIELDS_END;
const CHARACTER_NAME_OFFSET: usize = ACTOR_ADDRESS_OFFSET + 8;
const COLLECTION_NAME_OFFSET: usize = CHARACTER_NAME_OFFSET + NAME_SLOT_WIDTH;
const COLLECTION_NAME_WIDTH: usize = 64;
const FILES_OFFSET: usize = COLLECTION_NAME_OFFSET + COLLECTION_NAME_WIDTH;

/// Offsets and widths of the two path slots for a line of `capacity` bytes
fn file_slots(capacity: usize) -> ((usize, usize), (usize, usize)) {
    let room = capacity.saturating_sub(FILES_OFFSET);
    let requested_width = room / 2;
    let actual_offset = FILES_OFFSET + requested_width;
    (
        (FILES_OFFSET, requested_width),
        (actual_offset, room - requested_width),
    )
}

/// Marker type for the modded file resolution channel
#[derive(Debug, Clone, Copy)]
pub struct ModdedFileResolution;

/// One decoded file redirection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModdedFileEntry {
    pub age: f64,
    pub timestamp: DateTime<Utc>,
    pub thread_id: i32,
    pub character_name: String,
    pub character_address: String,
    pub collection_name: String,
    pub requested_file_name: String,
    pub actual_file_name: String,
}

impl ChannelKind for ModdedFileResolution {
    const NAME: &'static str = "ModdedFileResolution";
    const VERSION: u32 = 1;
    const DEFAULT_LINE_COUNT: u32 = 64;
    const DEFAULT_LINE_CAPACITY: u32 = 1024;
    const MIN_LINE_CAPACITY: u32 = (FILES_OFFSET + 16) as u32;

    type Event = ModdedFileEntry;

    fn decode(line: &[u8], crash_time_ms: i64) -> ModdedFileEntry {
        let common = CommonFields::decode(line, crash_time_ms);
        let ((requested_offset, requested_width), (actual_offset, actual_width)) =
            file_slots(line.len());
        ModdedFileEntry {
            age: common.age,
            timestamp: common.timestamp,
            thread_id: common.thread_id,
            character_name: codec::decode_string_lossy(line, CHARACTER_NAME_OFFSET, NAME_SLOT_WIDTH),
            character_address: codec::format_address(codec::decode_u64(line, ACTOR_ADDRESS_OFFSET)),
            collection_name: codec::decode_string_lossy(line, COLLECTION_NAME_OFFSET, COLLECTION_NAME_WIDTH),
            requested_file_name: codec::decode_string_lossy(line, requested_offset, requested_width),
            actual_file_name: codec::decode_string_lossy(line, actual_offset, actual_width),
        }
    }
}

impl ChannelWriter<ModdedFileResolution> {
    /// Record that `requested_file` was redirected to `actual_file` for an actor
    pub fn write_line(
        &self,
        actor_address: u64,
        actor_name: &[u8],
        collection_name: &str,
        requested_file: &[u8],
        actual_file: &[u8],
    ) {
        self.write_with(|line| {
            let ((requested_offset, requested_width), (actual_offset, actual_width)) =
                file_slots(line.len());
            codec::encode_u64(line, ACTOR_ADDRESS_OFFSET, actor_address);
            codec::encode_string(line, CHARACTER_NAME_OFFSET, NAME_SLOT_WIDTH, actor_name);
            codec::encode_string(
                line,
                COLLECTION_NAME_OFFSET,
                COLLECTION_NAME_WIDTH,
                collection_name.as_bytes(),
            );
            codec::encode_string(line, requested_offset, requested_width, requested_file);
            codec::encode_string(line, actual_offset, actual_width, actual_file);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_slots_split_remaining_space() {
        let ((req_off, req_w), (act_off, act_w)) = file_slots(1024);
        assert_eq!(req_off, 148);
        assert_eq!(req_w, 438);
        assert_eq!(act_off, 586);
        assert_eq!(act_off + act_w, 1024);

        // Odd remainder goes to the actual path
        let ((_, req_w), (_, act_w)) = file_slots(149 + 148);
        assert_eq!(req_w + 1, act_w);
    }

    #[test]
    fn test_decode_layout() {
        let mut line = vec![0u8; 1024];
        let ((req_off, req_w), (act_off, act_w)) = file_slots(1024);
        codec::encode_i64(&mut line, 0, 0);
        codec::encode_u64(&mut line, ACTOR_ADDRESS_OFFSET, 0xFF);
        codec::encode_string(&mut line, CHARACTER_NAME_OFFSET, NAME_SLOT_WIDTH, b"Npc");
        codec::encode_string(&mut line, COLLECTION_NAME_OFFSET, COLLECTION_NAME_WIDTH, b"Gear");
        codec::encode_string(&mut line, req_off, req_w, b"chara/equipment/e0001/model.mdl");
        codec::encode_string(&mut line, act_off, act_w, b"C:\\mods\\shirt\\model.mdl");

        let entry = ModdedFileResolution::decode(&line, 3_000);
        assert_eq!(entry.character_name, "Npc");
        assert_eq!(entry.character_address, "FF");
        assert_eq!(entry.collection_name, "Gear");
        assert_eq!(entry.requested_file_name, "chara/equipment/e0001/model.mdl");
        assert_eq!(entry.actual_file_name, "C:\\mods\\shirt\\model.mdl");
        assert!((entry.age - 3.0).abs() < 1e-9);
    }
}
