use super::handle::{CancelOutcome, Command, ControllerSnapshot, SessionHandle, StartOutcome};
use super::model::{
    CaptureRecord, SampleHandle, Session, SessionId, SessionState, SessionSummary, Verdict,
};
use crate::classifier::{Classifier, Prediction};
use crate::config::EvalcamConfig;
use crate::error::ClassifierError;
use crate::frame::FrameProcessor;
use crate::presentation::PresentationSink;
use crate::source::FrameSource;
use crate::storage::{SampleStore, SessionDir, SummaryFile};
use std::collections::HashMap;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

const COMMAND_QUEUE: usize = 32;
const SUMMARY_QUEUE: usize = 16;
/// Longest a session start waits for a just-acquired source to produce a frame
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(2);
const DROPPED_AT_DEADLINE: &str = "dropped at deadline";

/// Controller knobs, taken from `[session]`, `[classifier]` and `[storage]`
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// `None` runs until cancelled
    pub duration: Option<Duration>,
    pub cadence: Duration,
    /// `None` disables live preview
    pub preview_interval: Option<Duration>,
    pub release_source_on_finish: bool,
    pub accepted_label: String,
    pub jpeg_quality: u8,
    pub save_summary: bool,
}

impl ControllerSettings {
    pub fn from_config(config: &EvalcamConfig) -> Self {
        Self {
            duration: config.session.duration(),
            cadence: config.session.cadence(),
            preview_interval: config.session.preview_interval(),
            release_source_on_finish: config.session.release_source_on_finish,
            accepted_label: config.classifier.accepted_label.clone(),
            jpeg_quality: config.classifier.jpeg_quality,
            save_summary: config.storage.save_summary,
        }
    }
}

/// Sample waiting for its classifier verdict
#[derive(Debug)]
struct PendingCapture {
    sequence: u64,
    frame_id: u64,
    captured_at: SystemTime,
    handle: Option<SampleHandle>,
}

struct InFlight {
    capture: PendingCapture,
    task: JoinHandle<()>,
}

struct Completion {
    generation: u64,
    sequence: u64,
    outcome: Result<Prediction, ClassifierError>,
}

struct ActiveSession {
    session: Session,
    dir: Option<SessionDir>,
    generation: u64,
    in_flight: HashMap<u64, InFlight>,
}

impl ActiveSession {
    /// Abort every pending classification, returning the captures in
    /// sequence order
    fn abort_in_flight(&mut self) -> Vec<PendingCapture> {
        let mut aborted: Vec<PendingCapture> = self
            .in_flight
            .drain()
            .map(|(_, in_flight)| {
                in_flight.task.abort();
                in_flight.capture
            })
            .collect();
        aborted.sort_by_key(|capture| capture.sequence);

        if !aborted.is_empty() {
            debug!(
                "Aborted {} in-flight classifications for {}",
                aborted.len(),
                self.session.id
            );
        }
        aborted
    }
}

/// Owner of the session state machine.
///
/// Runs as a single task; commands, timer fires and classifier completions
/// are all serialized onto its loop.
pub struct SessionController {
    settings: ControllerSettings,
    source: Arc<dyn FrameSource>,
    classifier: Arc<dyn Classifier>,
    store: Option<SampleStore>,
    sink: Arc<dyn PresentationSink>,

    state: SessionState,
    active: Option<ActiveSession>,
    last_session: Option<Session>,
    last_summary: Option<SessionSummary>,
    generation: u64,
    last_base_id: Option<SessionId>,
    id_suffix: u32,

    cadence: Option<Interval>,
    deadline: Option<Pin<Box<Sleep>>>,
    preview: Option<Interval>,
    last_preview_frame: Option<u64>,

    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    summaries: broadcast::Sender<SessionSummary>,
}

impl SessionController {
    /// Spawn the controller task and return its handle.
    ///
    /// `store` is `None` when persistence is disabled; samples are then kept
    /// in memory.
    pub fn spawn(
        settings: ControllerSettings,
        source: Arc<dyn FrameSource>,
        classifier: Arc<dyn Classifier>,
        store: Option<SampleStore>,
        sink: Arc<dyn PresentationSink>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (summaries, _) = broadcast::channel(SUMMARY_QUEUE);

        let preview = settings.preview_interval.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        let controller = Self {
            settings,
            source,
            classifier,
            store,
            sink,
            state: SessionState::Idle,
            active: None,
            last_session: None,
            last_summary: None,
            generation: 0,
            last_base_id: None,
            id_suffix: 0,
            cadence: None,
            deadline: None,
            preview,
            last_preview_frame: None,
            commands: command_rx,
            completions_tx,
            completions_rx,
            summaries: summaries.clone(),
        };

        tokio::spawn(controller.run());

        SessionHandle {
            commands: command_tx,
            summaries,
        }
    }

    async fn run(mut self) {
        info!("Session controller started");

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All session handles dropped");
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                _ = wait_deadline(&mut self.deadline) => {
                    self.finalize().await;
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.apply_completion(completion).await;
                }
                _ = wait_tick(&mut self.cadence) => {
                    self.run_cycle().await;
                }
                _ = wait_tick(&mut self.preview) => {
                    self.render_preview().await;
                }
            }
        }

        self.discard_active();
        if let Err(e) = self.source.release().await {
            warn!("Failed to release frame source on shutdown: {}", e);
        }
        info!("Session controller stopped");
    }

    /// Returns `false` once the loop should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start(reply) => {
                let outcome = self.start().await;
                let _ = reply.send(outcome);
            }
            Command::Cancel(reply) => {
                let outcome = self.cancel().await;
                let _ = reply.send(outcome);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::LastSummary(reply) => {
                let _ = reply.send(self.last_summary.clone());
            }
            Command::LastSession(reply) => {
                let _ = reply.send(self.last_session.clone());
            }
            Command::Shutdown(reply) => {
                info!("Session controller shutdown requested");
                self.discard_active();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn snapshot(&self) -> ControllerSnapshot {
        let session = self.active.as_ref().map(|a| &a.session);
        ControllerSnapshot {
            state: self.state,
            session_id: session.map(|s| s.id.clone()),
            total_attempts: session.map_or(0, |s| s.total_attempts()),
            accepted_count: session.map_or(0, |s| s.accepted_count()),
            sample_count: session.map_or(0, |s| s.sample_count()),
            retained_bytes: session.map_or(0, |s| s.retained_payload_bytes()),
            cadence_armed: self.cadence.is_some(),
            deadline_armed: self.deadline.is_some(),
            in_flight: self.active.as_ref().map_or(0, |a| a.in_flight.len()),
        }
    }

    fn allocate_id(&mut self, started_at: SystemTime) -> SessionId {
        let base = SessionId::from_start(started_at);
        if self.last_base_id.as_ref() == Some(&base) {
            self.id_suffix += 1;
            base.with_suffix(self.id_suffix)
        } else {
            self.last_base_id = Some(base.clone());
            self.id_suffix = 1;
            base
        }
    }

    async fn start(&mut self) -> StartOutcome {
        if let Some(active) = &self.active {
            info!(
                "Start requested while session {} is active; ignoring",
                active.session.id
            );
            return StartOutcome::AlreadyActive(active.session.id.clone());
        }

        if !self.source.is_acquired() {
            // An unavailable source is not fatal; cycles just find no frame
            if let Err(e) = self.source.acquire().await {
                error!("Failed to acquire frame source: {}", e);
            }
        }
        if self.source.is_acquired() && !self.source.wait_ready(FIRST_FRAME_TIMEOUT).await {
            warn!(
                "Frame source produced nothing within {:?}; the first capture will be skipped",
                FIRST_FRAME_TIMEOUT
            );
        }

        let started_at = SystemTime::now();
        let id = self.allocate_id(started_at);

        let dir = match &self.store {
            Some(store) => match store.create_session(&id).await {
                Ok(dir) => Some(dir),
                Err(e) => {
                    warn!("Session {} will not be persisted: {}", id, e);
                    None
                }
            },
            None => None,
        };

        self.generation += 1;
        self.active = Some(ActiveSession {
            session: Session::new(id.clone(), started_at, self.settings.duration),
            dir,
            generation: self.generation,
            in_flight: HashMap::new(),
        });
        self.state = SessionState::Active;

        let now = Instant::now();
        let mut cadence = interval_at(now + self.settings.cadence, self.settings.cadence);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.cadence = Some(cadence);
        self.deadline = self
            .settings
            .duration
            .map(|duration| Box::pin(sleep_until(now + duration)));

        match self.settings.duration {
            Some(duration) => info!(
                "Session {} started ({:?}, one sample every {:?})",
                id, duration, self.settings.cadence
            ),
            None => info!(
                "Session {} started without deadline (one sample every {:?})",
                id, self.settings.cadence
            ),
        }
        self.sink.session_started(&id);

        self.run_cycle().await;

        StartOutcome::Started(id)
    }

    /// Pull, encode, persist, then hand the sample to the classifier
    async fn run_cycle(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let Some(frame) = self.source.latest_frame().await else {
            debug!("No frame available yet; skipping cycle");
            return;
        };

        let sequence = active.session.next_sequence();
        let captured_at = SystemTime::now();

        let jpeg = match FrameProcessor::encode_jpeg(&frame, self.settings.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!("Failed to encode frame {} for sample {}: {}", frame.id, sequence, e);
                let reason = e.to_string();
                log_session_error(active.dir.as_ref(), &reason).await;
                active.session.record(CaptureRecord {
                    sequence,
                    frame_id: frame.id,
                    captured_at,
                    handle: None,
                    verdict: Verdict::Errored(reason),
                });
                return;
            }
        };

        let handle = match (&self.store, &active.dir) {
            (Some(_), Some(dir)) => match dir.write_sample(sequence, captured_at, &jpeg).await {
                Ok(path) => Some(SampleHandle::Stored(path)),
                Err(e) => {
                    warn!("Failed to persist sample {}: {}", sequence, e);
                    None
                }
            },
            (Some(_), None) => None,
            (None, _) => Some(SampleHandle::InMemory(Arc::clone(&jpeg))),
        };

        debug!(
            "Sample {} captured from frame {} ({} bytes)",
            sequence,
            frame.id,
            jpeg.len()
        );

        let pending = PendingCapture {
            sequence,
            frame_id: frame.id,
            captured_at,
            handle,
        };
        let classifier = Arc::clone(&self.classifier);
        let completions = self.completions_tx.clone();
        let generation = active.generation;

        let task = tokio::spawn(async move {
            let outcome = classifier.classify(&jpeg).await;
            let _ = completions.send(Completion {
                generation,
                sequence,
                outcome,
            });
        });
        active.in_flight.insert(
            sequence,
            InFlight {
                capture: pending,
                task,
            },
        );
    }

    async fn apply_completion(&mut self, completion: Completion) {
        let Some((active, pending)) = self
            .active
            .as_mut()
            .filter(|active| active.generation == completion.generation)
            .and_then(|active| {
                let pending = active.in_flight.remove(&completion.sequence)?.capture;
                Some((active, pending))
            })
        else {
            debug!(
                "Dropping late classifier response for sample {}",
                completion.sequence
            );
            return;
        };

        let verdict = match completion.outcome {
            Ok(prediction) => {
                debug!(
                    "Sample {} classified as '{}'",
                    pending.sequence, prediction.label
                );
                Verdict::from_label(&prediction.label, &self.settings.accepted_label)
            }
            Err(e) => {
                warn!("Classification of sample {} failed: {}", pending.sequence, e);
                let reason = e.to_string();
                log_session_error(active.dir.as_ref(), &reason).await;
                Verdict::Errored(reason)
            }
        };

        let sequence = pending.sequence;
        let indicator = active.session.record(CaptureRecord {
            sequence,
            frame_id: pending.frame_id,
            captured_at: pending.captured_at,
            handle: pending.handle,
            verdict,
        });

        if let Some(indicator) = indicator {
            self.sink
                .render_verdict(&active.session.id, sequence, indicator);
        }
    }

    /// Deadline reached: stop sampling, score and report
    async fn finalize(&mut self) {
        self.cadence = None;
        self.deadline = None;

        let Some(mut active) = self.active.take() else {
            return;
        };
        self.state = SessionState::Finishing;

        // Captured but never classified: kept as errored so the stored files
        // and the record list agree
        for pending in active.abort_in_flight() {
            warn!(
                "Sample {} of {} {}",
                pending.sequence, active.session.id, DROPPED_AT_DEADLINE
            );
            log_session_error(active.dir.as_ref(), DROPPED_AT_DEADLINE).await;
            active.session.record(CaptureRecord {
                sequence: pending.sequence,
                frame_id: pending.frame_id,
                captured_at: pending.captured_at,
                handle: pending.handle,
                verdict: Verdict::Errored(DROPPED_AT_DEADLINE.to_string()),
            });
        }

        if self.settings.release_source_on_finish {
            if let Err(e) = self.source.release().await {
                warn!("Failed to release frame source: {}", e);
            }
        }

        let summary = active.session.finalize();

        if self.settings.save_summary {
            if let Some(dir) = &active.dir {
                let file = SummaryFile::from_session(&active.session, &summary);
                if let Err(e) = dir.save_summary(&file).await {
                    warn!("Failed to save summary for {}: {}", summary.session_id, e);
                }
            }
        }

        match &summary.representative {
            Some(representative) => info!(
                "Session {} finished: score {} ({}/{} accepted), representative {}",
                summary.session_id,
                summary.score,
                summary.accepted_count,
                summary.total_attempts,
                representative.handle
            ),
            None => info!(
                "Session {} finished: score {} ({}/{} accepted), no accepted sample",
                summary.session_id, summary.score, summary.accepted_count, summary.total_attempts
            ),
        }

        self.sink.render_summary(&summary);
        let _ = self.summaries.send(summary.clone());

        self.last_summary = Some(summary);
        self.last_session = Some(active.session);
        self.state = SessionState::Idle;
    }

    /// Hard abort: no score, no summary, source cycled
    async fn cancel(&mut self) -> CancelOutcome {
        let Some(id) = self.discard_active() else {
            debug!("Cancel requested with no active session");
            return CancelOutcome::NotActive;
        };

        info!("Session {} cancelled", id);
        self.sink.session_cancelled(&id);
        self.sink.reset();

        if let Err(e) = self.source.release().await {
            warn!("Failed to release frame source: {}", e);
        }
        if let Err(e) = self.source.acquire().await {
            error!("Failed to reacquire frame source: {}", e);
        }

        CancelOutcome::Cancelled(id)
    }

    /// Disarm timers and drop the running session, returning its id
    fn discard_active(&mut self) -> Option<SessionId> {
        self.cadence = None;
        self.deadline = None;
        self.state = SessionState::Idle;

        let mut active = self.active.take()?;
        active.abort_in_flight();
        Some(active.session.id)
    }

    async fn render_preview(&mut self) {
        if !self.source.is_acquired() {
            return;
        }
        if let Some(frame) = self.source.latest_frame().await {
            if self.last_preview_frame != Some(frame.id) {
                self.last_preview_frame = Some(frame.id);
                self.sink.render_frame(&frame);
            }
        }
    }
}

async fn log_session_error(dir: Option<&SessionDir>, message: &str) {
    if let Some(dir) = dir {
        if let Err(e) = dir.append_error(message).await {
            warn!("Failed to append to session error log: {}", e);
        }
    }
}

async fn wait_deadline(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn wait_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}
