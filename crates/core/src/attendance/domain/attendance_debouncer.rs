use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use super::attendance_log::AttendanceLog;
use crate::detection::domain::detection::Emotion;

/// Rate-limits attendance writes per persistent id.
///
/// The last-write table lives only in memory; a restart forgets it.
pub struct AttendanceDebouncer {
    interval: Duration,
    last_logged: HashMap<u32, DateTime<Utc>>,
}

impl AttendanceDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: HashMap::new(),
        }
    }

    /// True when `persistent_id` has never been logged or its last write is
    /// strictly older than the interval.
    pub fn is_due(&self, persistent_id: u32, now: DateTime<Utc>) -> bool {
        match self.last_logged.get(&persistent_id) {
            None => true,
            Some(last) => now - *last > self.interval,
        }
    }

    pub fn last_logged(&self, persistent_id: u32) -> Option<DateTime<Utc>> {
        self.last_logged.get(&persistent_id).copied()
    }

    /// Writes one attendance record for every due candidate, at most once per
    /// id. Returns the ids that were written.
    ///
    /// A failed write leaves the id due, so the next qualifying cycle retries.
    pub fn flush<L>(
        &mut self,
        candidates: &[(u32, Emotion)],
        sink: &mut L,
        now: DateTime<Utc>,
    ) -> Vec<u32>
    where
        L: AttendanceLog + ?Sized,
    {
        let mut seen = HashSet::new();
        let mut written = Vec::new();
        for &(pid, emotion) in candidates {
            if !seen.insert(pid) || !self.is_due(pid, now) {
                continue;
            }
            match sink.log_attendance(pid, emotion, now) {
                Ok(_) => {
                    self.last_logged.insert(pid, now);
                    written.push(pid);
                }
                Err(e) => log::warn!("Attendance write for face {pid} failed: {e}"),
            }
        }
        written
    }
}
