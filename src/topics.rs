//! ==============================================================================
//! topics.rs - room <-> channel naming
//! ==============================================================================
//!
//! purpose:
//!     the wire contract between the simulator and the ingestor. both derive
//!     channel names the same way, without sharing any runtime state:
//!
//! ```text
//!         "Room 2"  ->  "<root>/Room2"      (spaces removed)
//! ```
//!
//! ```text
//!     stripping spaces is not invertible on its own ("Room 1" and "Room1"
//!     collide), so the inverse is a lookup table over the known room set and
//!     construction fails if two rooms would share a channel.
//! ```
//!
//! ==============================================================================

use std::collections::HashMap;

use crate::domain::RoomId;
use crate::error::{HubError, Result};

/// reference channel root
pub const DEFAULT_ROOT: &str = "smartbuilding";

/// channel segment for a room: its display name with spaces removed
pub fn channel_segment(room: &RoomId) -> String {
    room.as_str().replace(' ', "")
}

#[derive(Clone, Debug)]
pub struct TopicMap {
    root: String,
    rooms: Vec<RoomId>,
    by_topic: HashMap<String, RoomId>,
}

impl TopicMap {
    pub fn new<I>(root: &str, rooms: I) -> Result<Self>
    where
        I: IntoIterator<Item = RoomId>,
    {
        let root = root.trim_end_matches('/').to_string();
        if root.is_empty() || root.contains(['+', '#']) {
            return Err(HubError::Config(format!(
                "topic root '{}' must be non-empty and free of wildcards",
                root
            )));
        }

        let mut ordered = Vec::new();
        let mut by_topic = HashMap::new();
        for room in rooms {
            let segment = channel_segment(&room);
            if segment.is_empty() || segment.contains(['+', '#', '/']) {
                return Err(HubError::Config(format!(
                    "room '{}' does not map to a valid channel",
                    room
                )));
            }
            let topic = format!("{}/{}", root, segment);
            if let Some(existing) = by_topic.get(&topic) {
                return Err(HubError::Config(format!(
                    "rooms '{}' and '{}' both map to channel '{}'",
                    existing, room, topic
                )));
            }
            by_topic.insert(topic, room.clone());
            ordered.push(room);
        }

        if ordered.is_empty() {
            return Err(HubError::Config("no rooms configured".to_string()));
        }

        Ok(Self {
            root,
            rooms: ordered,
            by_topic,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// known rooms in configuration order
    pub fn rooms(&self) -> &[RoomId] {
        &self.rooms
    }

    pub fn topic_for(&self, room: &RoomId) -> String {
        format!("{}/{}", self.root, channel_segment(room))
    }

    /// inverse mapping; `None` for anything outside the room set
    pub fn room_for(&self, topic: &str) -> Option<&RoomId> {
        self.by_topic.get(topic)
    }

    /// every channel to subscribe to, in room order
    pub fn topics(&self) -> Vec<String> {
        self.rooms.iter().map(|r| self.topic_for(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_rooms() -> Vec<RoomId> {
        (1..=4).map(|i| RoomId::new(format!("Room {}", i))).collect()
    }

    #[test]
    fn reference_channel_names() {
        let map = TopicMap::new(DEFAULT_ROOT, reference_rooms()).unwrap();
        assert_eq!(
            map.topics(),
            vec![
                "smartbuilding/Room1",
                "smartbuilding/Room2",
                "smartbuilding/Room3",
                "smartbuilding/Room4",
            ]
        );
    }

    #[test]
    fn inverse_maps_back_to_display_name() {
        let map = TopicMap::new(DEFAULT_ROOT, reference_rooms()).unwrap();
        for room in map.rooms() {
            assert_eq!(map.room_for(&map.topic_for(room)), Some(room));
        }
        assert_eq!(map.room_for("smartbuilding/Room9"), None);
        assert_eq!(map.room_for("other/Room1"), None);
        assert_eq!(map.room_for("smartbuilding/Room 1"), None);
    }

    #[test]
    fn rejects_colliding_rooms() {
        let err = TopicMap::new(DEFAULT_ROOT, vec!["Room 1".into(), "Room1".into()]).unwrap_err();
        assert!(matches!(err, HubError::Config(_)));
    }

    #[test]
    fn rejects_empty_room_set_and_wildcards() {
        assert!(TopicMap::new(DEFAULT_ROOT, Vec::new()).is_err());
        assert!(TopicMap::new(DEFAULT_ROOT, vec!["Lab #2".into()]).is_err());
        assert!(TopicMap::new(DEFAULT_ROOT, vec!["a/b".into()]).is_err());
        assert!(TopicMap::new("", reference_rooms()).is_err());
    }

    #[test]
    fn trailing_slash_on_root_is_ignored() {
        let map = TopicMap::new("site/north/", vec!["Server Room".into()]).unwrap();
        assert_eq!(map.topics(), vec!["site/north/ServerRoom"]);
        assert_eq!(map.root(), "site/north");
    }

    #[test]
    fn room_count_is_not_fixed() {
        let rooms: Vec<RoomId> = (1..=12).map(|i| RoomId::new(format!("Floor {}", i))).collect();
        let map = TopicMap::new(DEFAULT_ROOT, rooms).unwrap();
        assert_eq!(map.topics().len(), 12);
    }
}
