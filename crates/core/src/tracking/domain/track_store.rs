use chrono::{DateTime, Utc};

use crate::shared::bounding_box::BoundingBox;

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub persistent_id: u32,
    pub bounding_box: BoundingBox,
    pub last_seen_at: DateTime<Utc>,
    pub external_id: String,
}

/// Live tracks keyed by persistent id, in insertion order.
///
/// Order matters: the matcher visits tracks in this order, so earlier tracks
/// win contested detections. Ids handed out never go backwards for the
/// lifetime of the store, even across [`TrackStore::clear`].
#[derive(Clone, Debug, Default)]
pub struct TrackStore {
    tracks: Vec<Track>,
    highest_issued: u32,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        let highest_issued = tracks.iter().map(|t| t.persistent_id).max().unwrap_or(0);
        Self {
            tracks,
            highest_issued,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, persistent_id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.persistent_id == persistent_id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.tracks.iter().map(|t| t.persistent_id).collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drops every track. The id allocator keeps its position.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// First id a new track may take this cycle: one past the largest live id,
    /// and never at or below an id issued earlier.
    pub(crate) fn next_id(&self) -> u32 {
        let max_live = self.tracks.iter().map(|t| t.persistent_id).max().unwrap_or(0);
        max_live.max(self.highest_issued) + 1
    }

    pub(crate) fn replace(&mut self, tracks: Vec<Track>) {
        if let Some(max) = tracks.iter().map(|t| t.persistent_id).max() {
            self.highest_issued = self.highest_issued.max(max);
        }
        self.tracks = tracks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: u32) -> Track {
        Track {
            persistent_id: id,
            bounding_box: BoundingBox::new(0.1, 0.1, 0.2, 0.2),
            last_seen_at: Utc::now(),
            external_id: format!("ext-{id}"),
        }
    }

    #[test]
    fn test_empty_store_allocates_from_one() {
        assert_eq!(TrackStore::new().next_id(), 1);
    }

    #[test]
    fn test_next_id_follows_largest_live_id() {
        let store = TrackStore::from_tracks(vec![track(3), track(9), track(4)]);
        assert_eq!(store.next_id(), 10);
    }

    #[test]
    fn test_clear_keeps_allocator_position() {
        let mut store = TrackStore::from_tracks(vec![track(5)]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.next_id(), 6);
    }

    #[test]
    fn test_replace_preserves_order() {
        let mut store = TrackStore::new();
        store.replace(vec![track(2), track(1)]);
        assert_eq!(store.ids(), vec![2, 1]);
        assert_eq!(store.get(1).unwrap().external_id, "ext-1");
        assert!(store.get(3).is_none());
    }
}
