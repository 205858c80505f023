//! The live analyzer runtime.
//!
//! One thread runs a `select!` loop that owns every piece of mutable state:
//! the scheduler, the session monitor, the frame source, the directory and
//! all timers. A single worker thread performs the external detection call,
//! so at most one call is ever outstanding. The loop never blocks on the
//! worker, and the worker skips jobs from a capture session that has ended.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};

use crate::attendance::domain::attendance_log::AttendanceLog;
use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::detection_service::DetectionService;
use crate::identity::domain::identity_linker::IdentityDirectory;
use crate::pipeline::analysis_cycle::AnalysisResult;
use crate::pipeline::capture_scheduler::{
    AnalysisAlert, BackoffTicket, CaptureScheduler, CycleOutcome, CycleTicket, DetectionReply,
    ResumeOutcome, TickOutcome,
};
use crate::scheduling::activity_signal::ActivitySignal;
use crate::scheduling::timers::{OneShotTimer, RepeatingTask};
use crate::session::session_monitor::{SessionAction, SessionMonitor};
use crate::shared::frame::EncodedFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopCommand {
    StartCapture,
    StopCapture,
    Activity(ActivitySignal),
    Shutdown,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoopEvent {
    Published(AnalysisResult),
    Alert(AnalysisAlert),
    AlertCleared,
    /// Seconds left before forced logout.
    SessionWarning(u32),
    LoggedOut,
}

type DetectionJob = (CycleTicket, EncodedFrame);

pub struct PollingLoop<R> {
    scheduler: CaptureScheduler,
    session: SessionMonitor,
    source: Box<dyn FrameSource>,
    directory: R,
    poll_interval: Duration,
    poll: RepeatingTask,
    resume: OneShotTimer,
    pending_backoff: Option<BackoffTicket>,
    inactivity: OneShotTimer,
    countdown: RepeatingTask,
    logged_out: bool,
    /// Generation the worker compares queued jobs against.
    live_generation: Arc<AtomicU64>,
}

impl<R> PollingLoop<R>
where
    R: IdentityDirectory + AttendanceLog,
{
    pub fn new(
        scheduler: CaptureScheduler,
        session: SessionMonitor,
        source: Box<dyn FrameSource>,
        directory: R,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            session,
            source,
            directory,
            poll_interval,
            poll: RepeatingTask::idle(),
            resume: OneShotTimer::idle(),
            pending_backoff: None,
            inactivity: OneShotTimer::idle(),
            countdown: RepeatingTask::idle(),
            logged_out: false,
            live_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs until `Shutdown`, a forced logout, or the command channel closing.
    /// Hands the directory back so the caller can keep using it.
    pub fn run(
        mut self,
        detector: Box<dyn DetectionService>,
        commands: Receiver<LoopCommand>,
        events: Sender<LoopEvent>,
    ) -> Result<R, Box<dyn std::error::Error>> {
        let (job_tx, job_rx) = bounded::<DetectionJob>(1);
        let (reply_tx, reply_rx) = unbounded::<DetectionReply>();
        self.publish_generation();
        let worker = spawn_detector(detector, job_rx, reply_tx, self.live_generation.clone());

        let action = self.session.start();
        self.apply_session(action, &events);

        while !self.logged_out {
            let poll_rx = self.poll.receiver().clone();
            let resume_rx = self.resume.receiver().clone();
            let inactivity_rx = self.inactivity.receiver().clone();
            let countdown_rx = self.countdown.receiver().clone();

            select! {
                recv(commands) -> cmd => match cmd {
                    Ok(LoopCommand::StartCapture) => self.start_capture(&job_tx, &events),
                    Ok(LoopCommand::StopCapture) => self.stop_capture(),
                    Ok(LoopCommand::Activity(signal)) => {
                        if let Some(action) = self.session.on_activity(signal) {
                            self.apply_session(action, &events);
                        }
                    }
                    Ok(LoopCommand::Shutdown) | Err(_) => break,
                },
                recv(poll_rx) -> _ => self.tick(&job_tx, &events),
                recv(reply_rx) -> reply => match reply {
                    Ok(reply) => {
                        let outcome = self.scheduler.complete(reply, &mut self.directory);
                        self.handle_outcome(outcome, &events);
                    }
                    Err(_) => break,
                },
                recv(resume_rx) -> _ => {
                    self.resume.fired();
                    self.resume_after_backoff(&job_tx, &events);
                }
                recv(inactivity_rx) -> _ => {
                    self.inactivity.fired();
                    if let Some(action) = self.session.on_inactivity_elapsed() {
                        self.apply_session(action, &events);
                    }
                }
                recv(countdown_rx) -> _ => {
                    if let Some(action) = self.session.on_countdown_tick() {
                        self.apply_session(action, &events);
                    }
                }
            }
        }

        self.stop_capture();
        self.cancel_session_timers();
        self.scheduler.logger().summary();

        drop(job_tx);
        drop(reply_rx);
        worker
            .join()
            .map_err(|_| "detection worker panicked")?;
        Ok(self.directory)
    }

    fn start_capture(&mut self, job_tx: &Sender<DetectionJob>, events: &Sender<LoopEvent>) {
        self.stop_capture();
        if let Err(e) = self.source.open() {
            log::warn!("Could not start capture: {e}");
            emit(events, LoopEvent::Alert(AnalysisAlert::CaptureFailed(e.to_string())));
            return;
        }
        self.scheduler.start_session();
        self.publish_generation();
        self.poll.start(self.poll_interval);
        self.tick(job_tx, events);
    }

    /// Idempotent: safe on every exit path.
    fn stop_capture(&mut self) {
        self.poll.cancel();
        self.resume.cancel();
        self.pending_backoff = None;
        self.source.close();
        self.scheduler.stop_session();
        self.publish_generation();
    }

    fn publish_generation(&self) {
        self.live_generation
            .store(self.scheduler.generation(), Ordering::SeqCst);
    }

    fn tick(&mut self, job_tx: &Sender<DetectionJob>, events: &Sender<LoopEvent>) {
        let TickOutcome::Run(ticket) = self.scheduler.on_tick(Utc::now()) else {
            return;
        };
        let outcome = match self.source.capture() {
            Ok(frame) => match job_tx.try_send((ticket, frame)) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => {
                    log::debug!("Detection worker busy, dropping cycle {}", ticket.cycle);
                    self.scheduler.release(ticket);
                    return;
                }
                Err(TrySendError::Disconnected(_)) => self
                    .scheduler
                    .abort(ticket, "detection worker is gone".to_string()),
            },
            Err(e) => self.scheduler.abort(ticket, e.to_string()),
        };
        self.handle_outcome(outcome, events);
    }

    fn handle_outcome(&mut self, outcome: CycleOutcome, events: &Sender<LoopEvent>) {
        match outcome {
            CycleOutcome::Published {
                result,
                alert_cleared,
            } => {
                if alert_cleared {
                    emit(events, LoopEvent::AlertCleared);
                }
                emit(events, LoopEvent::Published(result));
            }
            CycleOutcome::Failed { alert, backoff } => {
                if let Some(ticket) = backoff {
                    self.poll.cancel();
                    self.resume.arm(ticket.delay);
                    self.pending_backoff = Some(ticket);
                }
                emit(events, LoopEvent::Alert(alert));
            }
            CycleOutcome::Discarded => {}
        }
    }

    fn resume_after_backoff(&mut self, job_tx: &Sender<DetectionJob>, events: &Sender<LoopEvent>) {
        let Some(ticket) = self.pending_backoff.take() else {
            return;
        };
        match self.scheduler.resume(ticket) {
            ResumeOutcome::Resumed { alert_cleared } => {
                if alert_cleared {
                    emit(events, LoopEvent::AlertCleared);
                }
                self.poll.start(self.poll_interval);
                self.tick(job_tx, events);
            }
            ResumeOutcome::Stale => {}
        }
    }

    fn apply_session(&mut self, action: SessionAction, events: &Sender<LoopEvent>) {
        match action {
            SessionAction::ArmInactivity(grace) => {
                self.countdown.cancel();
                self.inactivity.arm(grace);
            }
            SessionAction::StartCountdown { remaining, tick } => {
                self.inactivity.cancel();
                self.countdown.start(tick);
                emit(events, LoopEvent::SessionWarning(remaining));
            }
            SessionAction::CountdownChanged(remaining) => {
                emit(events, LoopEvent::SessionWarning(remaining));
            }
            SessionAction::Logout => {
                self.cancel_session_timers();
                self.logged_out = true;
                emit(events, LoopEvent::LoggedOut);
            }
        }
    }

    fn cancel_session_timers(&mut self) {
        self.inactivity.cancel();
        self.countdown.cancel();
    }
}

fn emit(events: &Sender<LoopEvent>, event: LoopEvent) {
    if events.send(event).is_err() {
        log::debug!("Event receiver dropped");
    }
}

fn spawn_detector(
    mut detector: Box<dyn DetectionService>,
    job_rx: Receiver<DetectionJob>,
    reply_tx: Sender<DetectionReply>,
    live_generation: Arc<AtomicU64>,
) -> JoinHandle<Box<dyn DetectionService>> {
    std::thread::spawn(move || {
        for (ticket, frame) in job_rx {
            if ticket.generation != live_generation.load(Ordering::SeqCst) {
                log::debug!("Skipping cycle {} from an ended session", ticket.cycle);
                continue;
            }
            let started = Instant::now();
            let result = detector.detect(&frame);
            let reply = DetectionReply {
                ticket,
                result,
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            };
            if reply_tx.send(reply).is_err() {
                break;
            }
        }
        detector
    })
}
