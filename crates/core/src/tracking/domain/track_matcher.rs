//! Greedy IoU reconciliation of one detection batch against the live tracks.
//!
//! Each track, in store order, claims the unclaimed detection with the highest
//! IoU above the threshold (first seen wins ties). Leftover detections become
//! new tracks with consecutive ids; tracks that claim nothing are dropped on
//! the spot, with no grace period.

use chrono::{DateTime, Utc};

use super::track_store::{Track, TrackStore};
use crate::detection::domain::detection::FaceDetection;
use crate::shared::constants::TRACK_IOU_THRESHOLD;

/// Result of one reconciliation pass.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchOutcome {
    /// Persistent id assigned to each input detection, by index.
    pub assignments: Vec<u32>,
    pub matched: usize,
    pub created: Vec<u32>,
    pub dropped: Vec<u32>,
}

pub struct TrackMatcher {
    iou_threshold: f64,
}

impl TrackMatcher {
    pub fn new(iou_threshold: f64) -> Self {
        Self { iou_threshold }
    }

    pub fn reconcile(
        &self,
        store: &mut TrackStore,
        detections: &[FaceDetection],
        now: DateTime<Utc>,
    ) -> MatchOutcome {
        let pairs = self.greedy_match(store.tracks(), detections);

        let mut assignments: Vec<Option<u32>> = vec![None; detections.len()];
        let mut next_tracks = Vec::with_capacity(detections.len());
        let mut dropped = Vec::new();

        for (track, claimed) in store.tracks().iter().zip(&pairs) {
            match claimed {
                Some(di) => {
                    let det = &detections[*di];
                    assignments[*di] = Some(track.persistent_id);
                    next_tracks.push(refreshed(track.persistent_id, det, now));
                }
                None => dropped.push(track.persistent_id),
            }
        }
        let matched = next_tracks.len();

        let created = create_new_tracks(
            store.next_id(),
            detections,
            &mut assignments,
            &mut next_tracks,
            now,
        );

        store.replace(next_tracks);

        MatchOutcome {
            assignments: assignments.into_iter().map(|a| a.unwrap_or(0)).collect(),
            matched,
            created,
            dropped,
        }
    }

    /// For each track in order, the index of the detection it claims.
    fn greedy_match(&self, tracks: &[Track], detections: &[FaceDetection]) -> Vec<Option<usize>> {
        let mut used = vec![false; detections.len()];
        tracks
            .iter()
            .map(|track| {
                let mut best: Option<(usize, f64)> = None;
                for (di, det) in detections.iter().enumerate() {
                    if used[di] {
                        continue;
                    }
                    let score = track.bounding_box.iou(&det.bounding_box);
                    if score > self.iou_threshold && best.map_or(true, |(_, b)| score > b) {
                        best = Some((di, score));
                    }
                }
                best.map(|(di, _)| {
                    used[di] = true;
                    di
                })
            })
            .collect()
    }
}

impl Default for TrackMatcher {
    fn default() -> Self {
        Self::new(TRACK_IOU_THRESHOLD)
    }
}

fn refreshed(persistent_id: u32, det: &FaceDetection, now: DateTime<Utc>) -> Track {
    Track {
        persistent_id,
        bounding_box: det.bounding_box,
        last_seen_at: now,
        external_id: det.external_id.clone(),
    }
}

fn create_new_tracks(
    first_id: u32,
    detections: &[FaceDetection],
    assignments: &mut [Option<u32>],
    next_tracks: &mut Vec<Track>,
    now: DateTime<Utc>,
) -> Vec<u32> {
    let mut next_id = first_id;
    let mut created = Vec::new();
    for (di, det) in detections.iter().enumerate() {
        if assignments[di].is_none() {
            assignments[di] = Some(next_id);
            next_tracks.push(refreshed(next_id, det, now));
            created.push(next_id);
            next_id += 1;
        }
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::Emotion;
    use crate::shared::bounding_box::BoundingBox;
    use chrono::Duration;

    fn det(x: f64, y: f64, w: f64, h: f64) -> FaceDetection {
        FaceDetection {
            external_id: format!("ext-{x}-{y}"),
            bounding_box: BoundingBox::new(x, y, w, h),
            emotion: Emotion::Neutral,
            confidence: 0.9,
            head_pose: None,
        }
    }

    fn track(id: u32, x: f64, y: f64, w: f64, h: f64) -> Track {
        Track {
            persistent_id: id,
            bounding_box: BoundingBox::new(x, y, w, h),
            last_seen_at: Utc::now() - Duration::seconds(2),
            external_id: "old".into(),
        }
    }

    #[test]
    fn test_new_detections_get_consecutive_ids() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::new();

        let outcome = matcher.reconcile(
            &mut store,
            &[det(0.0, 0.0, 0.2, 0.2), det(0.5, 0.5, 0.2, 0.2)],
            Utc::now(),
        );

        assert_eq!(outcome.assignments, vec![1, 2]);
        assert_eq!(outcome.created, vec![1, 2]);
        assert_eq!(store.ids(), vec![1, 2]);
    }

    #[test]
    fn test_identical_box_keeps_id() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::from_tracks(vec![track(4, 0.3, 0.3, 0.2, 0.2)]);

        let outcome = matcher.reconcile(&mut store, &[det(0.3, 0.3, 0.2, 0.2)], Utc::now());

        assert_eq!(outcome.assignments, vec![4]);
        assert!(outcome.created.is_empty());
        assert_eq!(store.ids(), vec![4]);
    }

    #[test]
    fn test_small_shift_updates_track() {
        // IoU ≈ 0.82 against the stored box.
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::from_tracks(vec![track(5, 0.1, 0.1, 0.2, 0.2)]);
        let now = Utc::now();

        let outcome = matcher.reconcile(&mut store, &[det(0.12, 0.1, 0.2, 0.2)], now);

        assert_eq!(outcome.assignments, vec![5]);
        assert_eq!(store.len(), 1);
        let updated = store.get(5).unwrap();
        assert_eq!(updated.bounding_box, BoundingBox::new(0.12, 0.1, 0.2, 0.2));
        assert_eq!(updated.last_seen_at, now);
        assert_eq!(updated.external_id, "ext-0.12-0.1");
    }

    #[test]
    fn test_empty_batch_drops_every_track() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::from_tracks(vec![
            track(1, 0.0, 0.0, 0.2, 0.2),
            track(2, 0.5, 0.5, 0.2, 0.2),
        ]);

        let outcome = matcher.reconcile(&mut store, &[], Utc::now());

        assert!(store.is_empty());
        assert_eq!(outcome.dropped, vec![1, 2]);
        assert!(outcome.assignments.is_empty());
    }

    #[test]
    fn test_lost_identity_returns_with_larger_id() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::new();
        let face = det(0.2, 0.2, 0.2, 0.2);

        let first = matcher.reconcile(&mut store, &[face.clone()], Utc::now());
        matcher.reconcile(&mut store, &[], Utc::now());
        let third = matcher.reconcile(&mut store, &[face], Utc::now());

        assert_eq!(first.assignments, vec![1]);
        assert!(third.assignments[0] > first.assignments[0]);
    }

    #[test]
    fn test_low_overlap_starts_new_track() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::from_tracks(vec![track(1, 0.0, 0.0, 0.2, 0.2)]);

        let outcome = matcher.reconcile(&mut store, &[det(0.1, 0.1, 0.2, 0.2)], Utc::now());

        // IoU = 0.01 / 0.07 ≈ 0.14
        assert_eq!(outcome.assignments, vec![2]);
        assert_eq!(outcome.dropped, vec![1]);
    }

    #[test]
    fn test_exact_threshold_is_rejected() {
        // Identical boxes score exactly 1.0, which does not exceed 1.0.
        let matcher = TrackMatcher::new(1.0);
        let mut store = TrackStore::from_tracks(vec![track(1, 0.2, 0.2, 0.4, 0.4)]);

        let outcome = matcher.reconcile(&mut store, &[det(0.2, 0.2, 0.4, 0.4)], Utc::now());

        assert_eq!(outcome.matched, 0);
    }

    #[test]
    fn test_track_picks_highest_iou_detection() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::from_tracks(vec![track(7, 0.1, 0.1, 0.2, 0.2)]);

        let outcome = matcher.reconcile(
            &mut store,
            &[det(0.14, 0.1, 0.2, 0.2), det(0.11, 0.1, 0.2, 0.2)],
            Utc::now(),
        );

        assert_eq!(outcome.assignments, vec![8, 7]);
    }

    #[test]
    fn test_earlier_track_wins_contested_detection() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::from_tracks(vec![
            track(1, 0.10, 0.1, 0.2, 0.2),
            track(2, 0.11, 0.1, 0.2, 0.2),
        ]);

        let outcome = matcher.reconcile(&mut store, &[det(0.11, 0.1, 0.2, 0.2)], Utc::now());

        // Track 2 is a perfect match but track 1 is visited first.
        assert_eq!(outcome.assignments, vec![1]);
        assert_eq!(outcome.dropped, vec![2]);
    }

    #[test]
    fn test_tie_goes_to_first_detection() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::from_tracks(vec![track(1, 0.1, 0.1, 0.2, 0.2)]);

        let outcome = matcher.reconcile(
            &mut store,
            &[det(0.1, 0.1, 0.2, 0.2), det(0.1, 0.1, 0.2, 0.2)],
            Utc::now(),
        );

        assert_eq!(outcome.assignments, vec![1, 2]);
    }

    #[test]
    fn test_matched_tracks_precede_new_tracks() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::from_tracks(vec![track(3, 0.6, 0.6, 0.2, 0.2)]);

        matcher.reconcile(
            &mut store,
            &[det(0.0, 0.0, 0.2, 0.2), det(0.6, 0.6, 0.2, 0.2)],
            Utc::now(),
        );

        assert_eq!(store.ids(), vec![3, 4]);
    }

    #[test]
    fn test_multiple_tracks_independent() {
        let matcher = TrackMatcher::default();
        let mut store = TrackStore::new();
        let t1 = matcher.reconcile(
            &mut store,
            &[det(0.0, 0.0, 0.2, 0.2), det(0.6, 0.6, 0.2, 0.2)],
            Utc::now(),
        );

        let t2 = matcher.reconcile(
            &mut store,
            &[det(0.61, 0.61, 0.2, 0.2), det(0.01, 0.01, 0.2, 0.2)],
            Utc::now(),
        );

        assert_eq!(t2.assignments, vec![t1.assignments[1], t1.assignments[0]]);
    }
}
