use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::attendance::domain::attendance_debouncer::AttendanceDebouncer;
use crate::attendance::domain::attendance_log::AttendanceLog;
use crate::detection::domain::detection::{DetectionBatch, FaceDetection, HandDetection};
use crate::identity::domain::identity_linker::{IdentityDirectory, IdentityLinker, Linkage};
use crate::identity::domain::person::StudentInfo;
use crate::shared::config::EngineConfig;
use crate::tracking::domain::track_matcher::TrackMatcher;
use crate::tracking::domain::track_store::TrackStore;

/// One face of a published result.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceResult {
    #[serde(flatten)]
    pub detection: FaceDetection,
    pub persistent_id: u32,
    /// Set only for linked, unblocked students.
    pub student: Option<StudentInfo>,
    pub blocked: bool,
    pub attendance_logged: bool,
}

/// The snapshot published after a successful cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub faces: Vec<FaceResult>,
    pub hands: Vec<HandDetection>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn attendance_writes(&self) -> usize {
        self.faces.iter().filter(|f| f.attendance_logged).count()
    }
}

/// Match, link and debounce for one detection batch.
///
/// Owns the track store and the last-logged table; nothing else mutates them.
pub struct AnalysisCycle {
    tracks: TrackStore,
    matcher: TrackMatcher,
    linker: IdentityLinker,
    debouncer: AttendanceDebouncer,
}

impl AnalysisCycle {
    pub fn new(matcher: TrackMatcher, debouncer: AttendanceDebouncer) -> Self {
        Self {
            tracks: TrackStore::new(),
            matcher,
            linker: IdentityLinker::new(),
            debouncer,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            TrackMatcher::new(config.iou_threshold),
            AttendanceDebouncer::new(config.attendance_interval()),
        )
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    pub fn debouncer(&self) -> &AttendanceDebouncer {
        &self.debouncer
    }

    /// Forgets every live track. Ids keep increasing afterwards.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    pub fn process<R>(
        &mut self,
        batch: DetectionBatch,
        registry: &mut R,
        now: DateTime<Utc>,
    ) -> AnalysisResult
    where
        R: IdentityDirectory + AttendanceLog + ?Sized,
    {
        let outcome = self.matcher.reconcile(&mut self.tracks, &batch.faces, now);
        if !outcome.created.is_empty() || !outcome.dropped.is_empty() {
            log::debug!(
                "Tracks: {} kept, new {:?}, lost {:?}",
                outcome.matched,
                outcome.created,
                outcome.dropped
            );
        }

        let linkages: Vec<Linkage> = outcome
            .assignments
            .iter()
            .map(|&pid| self.linker.resolve(pid, &*registry))
            .collect();

        let candidates: Vec<_> = batch
            .faces
            .iter()
            .zip(&outcome.assignments)
            .zip(&linkages)
            .filter(|(_, linkage)| linkage.student().is_some())
            .map(|((det, &pid), _)| (pid, det.emotion))
            .collect();
        let written = self.debouncer.flush(&candidates, registry, now);

        let faces = batch
            .faces
            .into_iter()
            .zip(outcome.assignments)
            .zip(linkages)
            .map(|((detection, persistent_id), linkage)| {
                let blocked = matches!(linkage, Linkage::Blocked { .. });
                let student = match linkage {
                    Linkage::Linked(s) => Some(s),
                    _ => None,
                };
                FaceResult {
                    detection,
                    persistent_id,
                    attendance_logged: student.is_some() && written.contains(&persistent_id),
                    student,
                    blocked,
                }
            })
            .collect();

        AnalysisResult {
            faces,
            hands: batch.hands,
            analyzed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::{Emotion, HandSign};
    use crate::identity::directory_service::DirectoryService;
    use crate::identity::domain::person::Year;
    use crate::persistence::infrastructure::in_memory_store::InMemoryStore;
    use crate::shared::bounding_box::BoundingBox;
    use chrono::{Duration, TimeZone};

    fn face(x: f64, emotion: Emotion) -> FaceDetection {
        FaceDetection {
            external_id: format!("g{x}"),
            bounding_box: BoundingBox::new(x, 0.1, 0.2, 0.2),
            emotion,
            confidence: 0.9,
            head_pose: None,
        }
    }

    fn registry() -> (DirectoryService, InMemoryStore) {
        let store = InMemoryStore::new();
        let mut dir = DirectoryService::load(Box::new(store.clone())).unwrap();
        for (roll, blocked) in [("R1", false), ("R2", true)] {
            dir.register_student(StudentInfo {
                name: format!("Student {roll}"),
                roll_number: roll.into(),
                department: "CSE".into(),
                year: Year::First,
                is_blocked: blocked,
                photo_base64: None,
            })
            .unwrap();
        }
        (dir, store)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn cycle() -> AnalysisCycle {
        AnalysisCycle::from_config(&EngineConfig::default())
    }

    #[test]
    fn test_unlinked_faces_get_ids_but_no_attendance() {
        let (mut dir, store) = registry();
        let mut cycle = cycle();

        let result = cycle.process(
            DetectionBatch::new(vec![face(0.1, Emotion::Happy), face(0.6, Emotion::Sad)], vec![]),
            &mut dir,
            at(0),
        );

        let ids: Vec<u32> = result.faces.iter().map(|f| f.persistent_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(result.faces.iter().all(|f| f.student.is_none()));
        assert!(store.snapshot().attendance.is_empty());
    }

    #[test]
    fn test_linked_face_is_labelled_and_logged_once_per_interval() {
        let (mut dir, store) = registry();
        let mut cycle = cycle();
        let batch = DetectionBatch::new(vec![face(0.1, Emotion::Happy)], vec![]);
        cycle.process(batch, &mut dir, at(0));
        dir.link_face(1, "R1").unwrap();

        let first = cycle.process(
            DetectionBatch::new(vec![face(0.12, Emotion::Happy)], vec![]),
            &mut dir,
            at(2),
        );
        let second = cycle.process(
            DetectionBatch::new(vec![face(0.12, Emotion::Neutral)], vec![]),
            &mut dir,
            at(4),
        );

        assert_eq!(first.faces[0].persistent_id, 1);
        assert_eq!(first.faces[0].student.as_ref().unwrap().roll_number, "R1");
        assert!(first.faces[0].attendance_logged);
        assert!(!second.faces[0].attendance_logged);
        assert_eq!(store.snapshot().attendance.len(), 1);
        assert_eq!(cycle.debouncer().last_logged(1), Some(at(2)));
    }

    #[test]
    fn test_blocked_student_is_hidden_and_not_logged() {
        let (mut dir, store) = registry();
        dir.link_face(1, "R2").unwrap();
        let mut cycle = cycle();

        let result = cycle.process(
            DetectionBatch::new(vec![face(0.1, Emotion::Happy)], vec![]),
            &mut dir,
            at(0),
        );

        assert!(result.faces[0].blocked);
        assert!(result.faces[0].student.is_none());
        assert!(store.snapshot().attendance.is_empty());
    }

    #[test]
    fn test_failed_attendance_write_is_retried() {
        let (mut dir, store) = registry();
        dir.link_face(1, "R1").unwrap();
        let mut cycle = cycle();
        store.set_fail_saves(true);

        let failed = cycle.process(
            DetectionBatch::new(vec![face(0.1, Emotion::Happy)], vec![]),
            &mut dir,
            at(0),
        );
        store.set_fail_saves(false);
        let retried = cycle.process(
            DetectionBatch::new(vec![face(0.1, Emotion::Happy)], vec![]),
            &mut dir,
            at(2),
        );

        assert!(!failed.faces[0].attendance_logged);
        assert!(retried.faces[0].attendance_logged);
        assert_eq!(store.snapshot().attendance[0].timestamp, at(2));
    }

    #[test]
    fn test_hands_pass_through() {
        let (mut dir, _) = registry();
        let hand = HandDetection {
            sign: HandSign::Peace,
            confidence: 0.8,
            bounding_box: BoundingBox::new(0.5, 0.5, 0.1, 0.1),
        };

        let batch = DetectionBatch::new(vec![], vec![hand.clone()]);
        let result = cycle().process(batch, &mut dir, at(0));

        assert_eq!(result.hands, vec![hand]);
        assert!(result.faces.is_empty());
    }

    #[test]
    fn test_reset_keeps_ids_increasing() {
        let (mut dir, _) = registry();
        let mut cycle = cycle();
        let batch = DetectionBatch::new(vec![face(0.1, Emotion::Happy)], vec![]);
        cycle.process(batch, &mut dir, at(0));

        cycle.reset();
        let result = cycle.process(
            DetectionBatch::new(vec![face(0.1, Emotion::Happy)], vec![]),
            &mut dir,
            at(0) + Duration::seconds(2),
        );

        assert_eq!(cycle.tracks().len(), 1);
        assert_eq!(result.faces[0].persistent_id, 2);
    }
}
