//! Tick gating, backoff and session bookkeeping around [`AnalysisCycle`].
//!
//! The scheduler never blocks: a tick hands out a [`CycleTicket`], the caller
//! performs the capture and the detection call however it likes, and hands
//! the outcome back. Tickets and backoff timers carry the capture-session
//! generation, so anything that arrives after a stop or restart is ignored.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::analysis_cycle::{AnalysisCycle, AnalysisResult};
use super::cycle_logger::CycleLogger;
use crate::attendance::domain::attendance_log::AttendanceLog;
use crate::detection::domain::detection::DetectionBatch;
use crate::detection::domain::detection_service::DetectionError;
use crate::identity::domain::identity_linker::IdentityDirectory;
use crate::shared::config::EngineConfig;

/// A user-visible problem with the live analysis.
#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisAlert {
    RateLimited { resume_in: Duration },
    NetworkUnreachable(String),
    DetectionFailed(String),
    CaptureFailed(String),
}

impl AnalysisAlert {
    pub fn from_detection_error(error: DetectionError, backoff: Duration) -> Self {
        match error {
            DetectionError::RateLimited => AnalysisAlert::RateLimited { resume_in: backoff },
            DetectionError::NetworkUnreachable(detail) => AnalysisAlert::NetworkUnreachable(detail),
            DetectionError::Failed(detail) => AnalysisAlert::DetectionFailed(detail),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AnalysisAlert::RateLimited { .. } => "API Rate Limit Exceeded",
            AnalysisAlert::NetworkUnreachable(_) => "Network Connection Issue",
            AnalysisAlert::DetectionFailed(_) => "Analysis Failed",
            AnalysisAlert::CaptureFailed(_) => "Camera Error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AnalysisAlert::RateLimited { resume_in } => {
                format!("Analysis paused. Resuming in {}s.", resume_in.as_secs())
            }
            AnalysisAlert::NetworkUnreachable(_) => {
                "Cannot connect to the AI service. Please check your connection.".to_string()
            }
            AnalysisAlert::DetectionFailed(_) => {
                "Could not analyze the frame. Retrying...".to_string()
            }
            AnalysisAlert::CaptureFailed(detail) => format!("Could not capture a frame: {detail}"),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AnalysisAlert::RateLimited { .. })
    }
}

impl std::fmt::Display for AnalysisAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}

/// Permission to run one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleTicket {
    pub generation: u64,
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    InFlight,
    Backoff,
    /// The detection worker still holds an earlier job.
    WorkerBusy,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Inactive => "inactive",
            SkipReason::InFlight => "in_flight",
            SkipReason::Backoff => "backoff",
            SkipReason::WorkerBusy => "worker_busy",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Run(CycleTicket),
    Skipped(SkipReason),
}

/// A pending resume after a rate limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffTicket {
    generation: u64,
    pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Published {
        result: AnalysisResult,
        alert_cleared: bool,
    },
    Failed {
        alert: AnalysisAlert,
        backoff: Option<BackoffTicket>,
    },
    /// The ticket belongs to a capture session that has since ended.
    Discarded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed { alert_cleared: bool },
    /// The pause already ended with its capture session; nothing to do.
    Stale,
}

/// What the caller needs after the detection call returns.
#[derive(Clone, Debug)]
pub struct DetectionReply {
    pub ticket: CycleTicket,
    pub result: Result<DetectionBatch, DetectionError>,
    pub elapsed_ms: f64,
}

pub struct CaptureScheduler {
    cycle: AnalysisCycle,
    logger: Box<dyn CycleLogger>,
    backoff: Duration,
    generation: u64,
    active: bool,
    in_flight: Option<u64>,
    paused_for_backoff: bool,
    alert: Option<AnalysisAlert>,
    published: Option<AnalysisResult>,
    cycles: u64,
}

impl CaptureScheduler {
    pub fn new(cycle: AnalysisCycle, backoff: Duration, logger: Box<dyn CycleLogger>) -> Self {
        Self {
            cycle,
            logger,
            backoff,
            generation: 0,
            active: false,
            in_flight: None,
            paused_for_backoff: false,
            alert: None,
            published: None,
            cycles: 0,
        }
    }

    pub fn from_config(config: &EngineConfig, logger: Box<dyn CycleLogger>) -> Self {
        Self::new(
            AnalysisCycle::from_config(config),
            config.rate_limit_backoff(),
            logger,
        )
    }

    /// Bumped by every session start and stop.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_paused_for_backoff(&self) -> bool {
        self.paused_for_backoff
    }

    pub fn alert(&self) -> Option<&AnalysisAlert> {
        self.alert.as_ref()
    }

    /// Last published result; `None` after a failure or a session change.
    pub fn published(&self) -> Option<&AnalysisResult> {
        self.published.as_ref()
    }

    pub fn analysis(&self) -> &AnalysisCycle {
        &self.cycle
    }

    pub fn logger(&self) -> &dyn CycleLogger {
        self.logger.as_ref()
    }

    pub fn start_session(&mut self) {
        self.reset();
        self.active = true;
        self.logger.info("Capture session started");
    }

    pub fn stop_session(&mut self) {
        if self.active {
            self.logger.info("Capture session stopped");
        }
        self.reset();
        self.active = false;
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.cycle.reset();
        self.in_flight = None;
        self.paused_for_backoff = false;
        self.alert = None;
        self.published = None;
    }

    /// Dropped ticks are never queued.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let skip = if !self.active {
            Some(SkipReason::Inactive)
        } else if self.in_flight.is_some() {
            Some(SkipReason::InFlight)
        } else if self.paused_for_backoff {
            Some(SkipReason::Backoff)
        } else {
            None
        };
        if let Some(reason) = skip {
            self.logger.skipped(reason.as_str());
            return TickOutcome::Skipped(reason);
        }

        self.cycles += 1;
        self.in_flight = Some(self.generation);
        self.logger.cycle_started(self.cycles);
        TickOutcome::Run(CycleTicket {
            generation: self.generation,
            cycle: self.cycles,
            started_at: now,
        })
    }

    fn is_current(&self, ticket: &CycleTicket) -> bool {
        ticket.generation == self.generation && self.in_flight == Some(ticket.generation)
    }

    pub fn complete<R>(&mut self, reply: DetectionReply, registry: &mut R) -> CycleOutcome
    where
        R: IdentityDirectory + AttendanceLog + ?Sized,
    {
        if !self.is_current(&reply.ticket) {
            log::debug!("Discarding result of cycle {} from an ended session", reply.ticket.cycle);
            return CycleOutcome::Discarded;
        }
        self.in_flight = None;
        self.logger.timing("detect", reply.elapsed_ms);

        match reply.result {
            Ok(batch) => {
                let started = std::time::Instant::now();
                let result = self.cycle.process(batch, registry, reply.ticket.started_at);
                self.logger
                    .timing("reconcile", started.elapsed().as_secs_f64() * 1000.0);
                self.logger.metric("faces", result.faces.len() as f64);
                self.logger
                    .metric("attendance_writes", result.attendance_writes() as f64);

                let alert_cleared = self.alert.take().is_some();
                self.published = Some(result.clone());
                CycleOutcome::Published {
                    result,
                    alert_cleared,
                }
            }
            Err(error) => self.fail(AnalysisAlert::from_detection_error(error, self.backoff)),
        }
    }

    /// The frame could not be captured; the cycle ends without a detection call.
    pub fn abort(&mut self, ticket: CycleTicket, detail: String) -> CycleOutcome {
        if !self.is_current(&ticket) {
            return CycleOutcome::Discarded;
        }
        self.in_flight = None;
        self.fail(AnalysisAlert::CaptureFailed(detail))
    }

    /// The worker could not take the job: the tick is dropped, no alert.
    pub fn release(&mut self, ticket: CycleTicket) {
        if !self.is_current(&ticket) {
            return;
        }
        self.in_flight = None;
        self.logger.skipped(SkipReason::WorkerBusy.as_str());
    }

    fn fail(&mut self, alert: AnalysisAlert) -> CycleOutcome {
        log::warn!("{alert}");
        self.published = None;
        self.alert = Some(alert.clone());
        let backoff = if alert.is_rate_limit() {
            self.paused_for_backoff = true;
            Some(BackoffTicket {
                generation: self.generation,
                delay: self.backoff,
            })
        } else {
            None
        };
        CycleOutcome::Failed { alert, backoff }
    }

    pub fn resume(&mut self, ticket: BackoffTicket) -> ResumeOutcome {
        if ticket.generation != self.generation || !self.active || !self.paused_for_backoff {
            return ResumeOutcome::Stale;
        }
        self.paused_for_backoff = false;
        let alert_cleared = self.alert.take().is_some();
        self.logger.info("Resuming analysis after rate limit");
        ResumeOutcome::Resumed { alert_cleared }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::{Emotion, FaceDetection};
    use crate::identity::directory_service::DirectoryService;
    use crate::persistence::infrastructure::in_memory_store::InMemoryStore;
    use crate::pipeline::cycle_logger::NullCycleLogger;
    use crate::shared::bounding_box::BoundingBox;
    use chrono::TimeZone;

    fn scheduler() -> CaptureScheduler {
        CaptureScheduler::from_config(&EngineConfig::default(), Box::new(NullCycleLogger))
    }

    fn directory() -> DirectoryService {
        DirectoryService::load(Box::new(InMemoryStore::new())).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn batch(x: f64) -> DetectionBatch {
        DetectionBatch::new(
            vec![FaceDetection {
                external_id: "a".into(),
                bounding_box: BoundingBox::new(x, 0.1, 0.2, 0.2),
                emotion: Emotion::Neutral,
                confidence: 0.9,
                head_pose: None,
            }],
            vec![],
        )
    }

    fn reply(
        ticket: CycleTicket,
        result: Result<DetectionBatch, DetectionError>,
    ) -> DetectionReply {
        DetectionReply {
            ticket,
            result,
            elapsed_ms: 5.0,
        }
    }

    fn run(s: &mut CaptureScheduler, now: DateTime<Utc>) -> CycleTicket {
        match s.on_tick(now) {
            TickOutcome::Run(ticket) => ticket,
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_ticks_skipped_without_session() {
        let mut s = scheduler();
        assert_eq!(s.on_tick(at(0)), TickOutcome::Skipped(SkipReason::Inactive));
    }

    #[test]
    fn test_at_most_one_cycle_in_flight() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();

        let ticket = run(&mut s, at(0));
        assert_eq!(s.on_tick(at(2)), TickOutcome::Skipped(SkipReason::InFlight));

        s.complete(reply(ticket, Ok(batch(0.1))), &mut dir);
        assert!(!s.is_in_flight());
        assert!(matches!(s.on_tick(at(4)), TickOutcome::Run(_)));
    }

    #[test]
    fn test_successful_cycle_publishes() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();
        let ticket = run(&mut s, at(0));

        let outcome = s.complete(reply(ticket, Ok(batch(0.1))), &mut dir);

        let CycleOutcome::Published { result, alert_cleared } = outcome else {
            panic!("expected publish");
        };
        assert!(!alert_cleared);
        assert_eq!(result.faces[0].persistent_id, 1);
        assert_eq!(result.analyzed_at, at(0));
        assert_eq!(s.published(), Some(&result));
    }

    #[test]
    fn test_rate_limit_pauses_until_resume() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();
        let ticket = run(&mut s, at(0));

        let outcome = s.complete(reply(ticket, Err(DetectionError::RateLimited)), &mut dir);

        let CycleOutcome::Failed { alert, backoff: Some(backoff) } = outcome else {
            panic!("expected rate-limit backoff");
        };
        assert_eq!(backoff.delay, Duration::from_millis(61_000));
        assert_eq!(alert.message(), "Analysis paused. Resuming in 61s.");
        assert!(s.is_paused_for_backoff());
        assert!(s.published().is_none());
        assert_eq!(s.on_tick(at(2)), TickOutcome::Skipped(SkipReason::Backoff));

        assert_eq!(s.resume(backoff), ResumeOutcome::Resumed { alert_cleared: true });
        assert!(s.alert().is_none());
        assert!(matches!(s.on_tick(at(63)), TickOutcome::Run(_)));
    }

    #[test]
    fn test_network_error_surfaces_without_pause() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();
        let ticket = run(&mut s, at(0));

        let outcome = s.complete(
            reply(ticket, Err(DetectionError::NetworkUnreachable("refused".into()))),
            &mut dir,
        );

        assert!(matches!(
            outcome,
            CycleOutcome::Failed { alert: AnalysisAlert::NetworkUnreachable(_), backoff: None }
        ));
        assert!(!s.is_paused_for_backoff());
        let next = run(&mut s, at(2));
        let CycleOutcome::Published { alert_cleared, .. } =
            s.complete(reply(next, Ok(batch(0.1))), &mut dir)
        else {
            panic!("expected publish");
        };
        assert!(alert_cleared);
    }

    #[test]
    fn test_result_after_stop_is_discarded() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();
        let ticket = run(&mut s, at(0));

        s.stop_session();

        assert_eq!(s.complete(reply(ticket, Ok(batch(0.1))), &mut dir), CycleOutcome::Discarded);
        assert!(s.analysis().tracks().is_empty());
        assert!(s.published().is_none());
    }

    #[test]
    fn test_result_from_previous_session_is_discarded_after_restart() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();
        let stale = run(&mut s, at(0));
        s.stop_session();
        s.start_session();
        let fresh = run(&mut s, at(2));

        assert_eq!(s.complete(reply(stale, Ok(batch(0.1))), &mut dir), CycleOutcome::Discarded);
        assert!(s.is_in_flight());
        assert!(matches!(
            s.complete(reply(fresh, Ok(batch(0.1))), &mut dir),
            CycleOutcome::Published { .. }
        ));
    }

    #[test]
    fn test_resume_after_session_end_is_stale() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();
        let ticket = run(&mut s, at(0));
        let CycleOutcome::Failed { backoff: Some(backoff), .. } =
            s.complete(reply(ticket, Err(DetectionError::RateLimited)), &mut dir)
        else {
            panic!("expected backoff");
        };

        s.stop_session();

        assert!(!s.is_paused_for_backoff());
        assert_eq!(s.resume(backoff), ResumeOutcome::Stale);
        assert!(s.alert().is_none());
        assert!(!s.is_active());
    }

    #[test]
    fn test_resume_from_previous_session_does_not_touch_new_one() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();
        let ticket = run(&mut s, at(0));
        let CycleOutcome::Failed { backoff: Some(old), .. } =
            s.complete(reply(ticket, Err(DetectionError::RateLimited)), &mut dir)
        else {
            panic!("expected backoff");
        };
        s.stop_session();
        s.start_session();
        let ticket = run(&mut s, at(2));
        s.complete(reply(ticket, Err(DetectionError::RateLimited)), &mut dir);

        assert_eq!(s.resume(old), ResumeOutcome::Stale);
        assert!(s.is_paused_for_backoff());
        assert!(s.alert().is_some());
    }

    #[test]
    fn test_released_ticket_frees_the_slot_without_alert() {
        let mut s = scheduler();
        s.start_session();
        let ticket = run(&mut s, at(0));

        s.release(ticket);

        assert!(!s.is_in_flight());
        assert!(s.alert().is_none());
        assert!(matches!(s.on_tick(at(2)), TickOutcome::Run(_)));
    }

    #[test]
    fn test_release_of_stale_ticket_keeps_current_cycle_in_flight() {
        let mut s = scheduler();
        s.start_session();
        let stale = run(&mut s, at(0));
        s.start_session();
        run(&mut s, at(2));

        s.release(stale);

        assert!(s.is_in_flight());
    }

    #[test]
    fn test_start_session_clears_tracks_and_alert() {
        let mut s = scheduler();
        let mut dir = directory();
        s.start_session();
        let t1 = run(&mut s, at(0));
        s.complete(reply(t1, Ok(batch(0.1))), &mut dir);
        let t2 = run(&mut s, at(2));
        s.complete(reply(t2, Err(DetectionError::Failed("boom".into()))), &mut dir);
        assert!(s.alert().is_some());

        s.start_session();

        assert!(s.alert().is_none());
        assert!(s.analysis().tracks().is_empty());
        let t3 = run(&mut s, at(4));
        let CycleOutcome::Published { result, .. } = s.complete(reply(t3, Ok(batch(0.1))), &mut dir)
        else {
            panic!("expected publish");
        };
        assert_eq!(result.faces[0].persistent_id, 2);
    }

    #[test]
    fn test_capture_failure_surfaces_alert() {
        let mut s = scheduler();
        s.start_session();
        let ticket = run(&mut s, at(0));

        let outcome = s.abort(ticket, "device busy".into());

        assert!(matches!(
            outcome,
            CycleOutcome::Failed { alert: AnalysisAlert::CaptureFailed(_), backoff: None }
        ));
        assert!(!s.is_in_flight());
    }
}
