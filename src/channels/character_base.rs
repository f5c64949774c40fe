//! Character base construction channel
//!
//! Rare events, so few lines; collection names get most of the room.
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 12 | 8 | actor address |
//! | 20 | 64 | character name slot |
//! | 84 | rest | collection name slot |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelKind, ChannelWriter, CommonFields, COMMON_FIELDS_END, NAME_SLOT_WIDTH};
use crate::codec;

const ACTOR_ADDRESS_OFFSET: usize = COMMON_FIELDS_END;
const CHARACTER_NAME_OFFSET: usize = ACTOR_ADDRESS_OFFSET + 8;
const COLLECTION_NAME_OFFSET: usize = CHARACTER_NAME_OFFSET + NAME_SLOT_WIDTH;

/// Marker type for the character base construction channel
#[derive(Debug, Clone, Copy)]
pub struct CharacterBaseConstruction;

/// One decoded character base construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CharacterBaseEntry {
    pub age: f64,
    pub timestamp: DateTime<Utc>,
    pub thread_id: i32,
    pub character_name: String,
    pub character_address: String,
    pub collection_name: String,
}

impl ChannelKind for CharacterBaseConstruction {
    const NAME: &'static str = "CharacterBaseConstruction";
    const VERSION: u32 = 1;
    const DEFAULT_LINE_COUNT: u32 = 16;
    const DEFAULT_LINE_CAPACITY: u32 = 512;
    const MIN_LINE_CAPACITY: u32 = (COLLECTION_NAME_OFFSET + 8) as u32;

    type Event = CharacterBaseEntry;

    fn decode(line: &[u8], crash_time_ms: i64) -> CharacterBaseEntry {
        let common = CommonFields::decode(line, crash_time_ms);
        CharacterBaseEntry {
            age: common.age,
            timestamp: common.timestamp,
            thread_id: common.thread_id,
            character_name: codec::decode_string_lossy(line, CHARACTER_NAME_OFFSET, NAME_SLOT_WIDTH),
            character_address: codec::format_address(codec::decode_u64(line, ACTOR_ADDRESS_OFFSET)),
            collection_name: codec::decode_string_lossy(line, COLLECTION_NAME_OFFSET, line.len()),
        }
    }
}

impl ChannelWriter<CharacterBaseConstruction> {
    /// Record the construction of a character base for an actor
    pub fn write_line(&self, actor_address: u64, actor_name: &[u8], collection_name: &str) {
        self.write_with(|line| {
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
    fn test_decode_layout() {
        let mut line = vec![0u8; 512];
        codec::encode_i64(&mut line, 0, 1_000);
        codec::encode_u64(&mut line, ACTOR_ADDRESS_OFFSET, 0xABC);
        codec::encode_string(&mut line, CHARACTER_NAME_OFFSET, NAME_SLOT_WIDTH, b"Player One");
        codec::encode_string(&mut line, COLLECTION_NAME_OFFSET, 512 - COLLECTION_NAME_OFFSET, b"Interface");

        let entry = CharacterBaseConstruction::decode(&line, 1_500);
        assert_eq!(entry.character_name, "Player One");
        assert_eq!(entry.character_address, "ABC");
        assert_eq!(entry.collection_name, "Interface");
        assert!((entry.age - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_min_capacity_fits_layout() {
        assert!(CharacterBaseConstruction::MIN_LINE_CAPACITY as usize > COLLECTION_NAME_OFFSET);
        assert!(CharacterBaseConstruction::DEFAULT_LINE_CAPACITY >= CharacterBaseConstruction::MIN_LINE_CAPACITY);
    }
}
