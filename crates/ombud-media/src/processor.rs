//! # Attachment Processor
//!
//! One background worker per submitted attachment. The worker runs the
//! class-appropriate compression strategy on a blocking thread, publishes
//! progress through a watch channel, and commits exactly one terminal
//! state:
//!
//! ```text
//! submit ──▶ Pending ──▶ Compressing ──▶ Compressed   output via take_output
//!                             │
//!                             ├─────────▶ Cancelled   owner called cancel()
//!                             └─────────▶ Failed      strategy error or stall
//! ```
//!
//! A cancel that lands before the worker's final token check always wins,
//! even when compression has effectively finished — the near-complete
//! output is discarded and the state is `Cancelled`, never `Compressed`.
//!
//! Progress snapshots are read without blocking (the watch channel keeps
//! the latest value) and the reported percentage never decreases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ombud_core::{AttachmentId, MediationError};

use crate::cancel::CancelToken;
use crate::classify::MimeClass;
use crate::strategy::{
    strategy_for, CompressedOutput, CompressionError, CompressionStrategy, JobCtl, MediaPolicy,
    SourceFile,
};

// ─── States and Snapshots ────────────────────────────────────────────

/// Lifecycle state of one attachment job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentState {
    /// Accepted but not yet picked up by a worker.
    Pending,
    /// A worker is running the compression strategy.
    Compressing,
    /// Output is ready; `take_output` will hand it over.
    Compressed,
    /// The owner cancelled before the worker committed.
    Cancelled,
    /// The strategy failed or the stall watchdog fired.
    Failed,
}

impl AttachmentState {
    /// The wire name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Compressing => "compressing",
            Self::Compressed => "compressed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether the job has finished, one way or another.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Compressed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one attachment job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentSnapshot {
    /// The attachment this snapshot describes.
    pub id: AttachmentId,
    /// Current lifecycle state.
    pub state: AttachmentState,
    /// Monotonically non-decreasing progress, 0-100.
    pub progress_percent: u8,
    /// Size of the submitted file in bytes.
    pub original_size: u64,
    /// Size of the compressed output, once available.
    pub final_size: Option<u64>,
    /// Failure reason, set only in the `Failed` state.
    pub error: Option<String>,
    /// Media class the file was bucketed into.
    pub mime_class: MimeClass,
}

/// Metadata for a finished attachment, carried on chat messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// The attachment identifier.
    pub id: AttachmentId,
    /// Original file name, for display.
    pub name: String,
    /// Media class of the file.
    pub mime_class: MimeClass,
    /// Size before compression, in bytes.
    pub original_size: u64,
    /// Size after compression, in bytes.
    pub final_size: u64,
    /// True when the bytes passed through uncompressed.
    pub passthrough: bool,
}

// ─── Handle ──────────────────────────────────────────────────────────

/// Owner-side handle to a submitted attachment.
///
/// `snapshot` never blocks; `wait_terminal` is for callers that want to
/// park until the job settles.
#[derive(Debug, Clone)]
pub struct AttachmentHandle {
    id: AttachmentId,
    rx: watch::Receiver<AttachmentSnapshot>,
}

impl AttachmentHandle {
    /// The attachment this handle tracks.
    pub fn id(&self) -> AttachmentId {
        self.id
    }

    /// The latest snapshot, without blocking.
    pub fn snapshot(&self) -> AttachmentSnapshot {
        self.rx.borrow().clone()
    }

    /// Waits until the job reaches a terminal state and returns the final
    /// snapshot.
    pub async fn wait_terminal(&mut self) -> AttachmentSnapshot {
        loop {
            let snap = self.rx.borrow().clone();
            if snap.state.is_terminal() {
                return snap;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone; the last observed value is final.
                return self.rx.borrow().clone();
            }
        }
    }
}

// ─── Processor ───────────────────────────────────────────────────────

struct Job {
    token: CancelToken,
    tx: Arc<watch::Sender<AttachmentSnapshot>>,
    rx: watch::Receiver<AttachmentSnapshot>,
    output: Arc<Mutex<Option<(AttachmentRecord, Vec<u8>)>>>,
}

/// Runs attachment compression jobs and tracks their lifecycles.
///
/// Jobs are keyed by the client-supplied [`AttachmentId`]; resubmitting
/// an id whose previous job settled replaces it (retry), while
/// resubmitting a live id is refused.
pub struct AttachmentProcessor {
    policy: MediaPolicy,
    jobs: RwLock<HashMap<AttachmentId, Job>>,
}

impl AttachmentProcessor {
    /// Creates a processor with the given policy.
    pub fn new(policy: MediaPolicy) -> Self {
        Self {
            policy,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// The policy this processor runs under.
    pub fn policy(&self) -> &MediaPolicy {
        &self.policy
    }

    /// Submits a file for compression with the strategy its mime class
    /// selects. Returns immediately with a handle; the work happens on a
    /// background task.
    pub fn submit(&self, source: SourceFile) -> Result<AttachmentHandle, MediationError> {
        let strategy = strategy_for(source.mime_class(), &self.policy);
        self.submit_with_strategy(source, strategy)
    }

    /// Submits with an explicit strategy. Public seam for callers that
    /// plug in their own transcoder.
    pub fn submit_with_strategy(
        &self,
        source: SourceFile,
        strategy: Box<dyn CompressionStrategy>,
    ) -> Result<AttachmentHandle, MediationError> {
        if source.bytes.is_empty() {
            return Err(MediationError::Validation(format!(
                "attachment {} is empty",
                source.id
            )));
        }

        let id = source.id;
        let mime_class = source.mime_class();
        let initial = AttachmentSnapshot {
            id,
            state: AttachmentState::Pending,
            progress_percent: 0,
            original_size: source.bytes.len() as u64,
            final_size: None,
            error: None,
            mime_class,
        };

        let token = CancelToken::new();
        let (tx, rx) = watch::channel(initial);
        let tx = Arc::new(tx);
        let output = Arc::new(Mutex::new(None));

        {
            let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = jobs.get(&id) {
                if !existing.rx.borrow().state.is_terminal() {
                    return Err(MediationError::Validation(format!(
                        "attachment {id} is already being processed"
                    )));
                }
                debug!(attachment = %id, "resubmitting settled attachment");
            }
            jobs.insert(
                id,
                Job {
                    token: token.clone(),
                    tx: tx.clone(),
                    rx: rx.clone(),
                    output: output.clone(),
                },
            );
        }

        metrics::counter!("ombud_attachment_jobs_total").increment(1);
        info!(attachment = %id, class = %mime_class, bytes = source.bytes.len(), "attachment submitted");

        self.spawn_worker(source, strategy, token, tx, output);

        Ok(AttachmentHandle { id, rx })
    }

    fn spawn_worker(
        &self,
        source: SourceFile,
        strategy: Box<dyn CompressionStrategy>,
        token: CancelToken,
        tx: Arc<watch::Sender<AttachmentSnapshot>>,
        output: Arc<Mutex<Option<(AttachmentRecord, Vec<u8>)>>>,
    ) {
        let id = source.id;
        let name = source.name.clone();
        let mime_class = source.mime_class();
        let original_size = source.bytes.len() as u64;
        let quiet_period = self.policy.quiet_period;
        let last_progress = Arc::new(Mutex::new(Instant::now()));
        let stalled = Arc::new(AtomicBool::new(false));

        // Watchdog: a job that reports nothing for a full quiet period is
        // cancelled and recorded as failed, not left compressing forever.
        let watchdog = {
            let token = token.clone();
            let rx = tx.subscribe();
            let last_progress = last_progress.clone();
            let stalled = stalled.clone();
            tokio::spawn(async move {
                let tick = (quiet_period / 4).max(std::time::Duration::from_millis(10));
                loop {
                    tokio::time::sleep(tick).await;
                    if rx.borrow().state.is_terminal() {
                        return;
                    }
                    let quiet_for = last_progress
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .elapsed();
                    if quiet_for >= quiet_period {
                        warn!(attachment = %id, ?quiet_for, "attachment job stalled, cancelling");
                        stalled.store(true, Ordering::SeqCst);
                        token.cancel();
                        return;
                    }
                }
            })
        };

        let ctl = {
            let tx = tx.clone();
            let last_progress = last_progress.clone();
            JobCtl::new(token.clone(), move |pct| {
                *last_progress.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
                tx.send_modify(|snap| {
                    if pct > snap.progress_percent {
                        snap.progress_percent = pct;
                    }
                });
            })
        };

        tokio::spawn(async move {
            tx.send_modify(|snap| snap.state = AttachmentState::Compressing);
            let result =
                tokio::task::spawn_blocking(move || strategy.compress(&source, &ctl)).await;
            watchdog.abort();

            let result = match result {
                Ok(inner) => inner,
                Err(join_err) => Err(CompressionError::Failed(format!(
                    "worker panicked: {join_err}"
                ))),
            };

            // Final token check: a cancel that raced the last chunk still
            // wins over the finished output.
            let result = match result {
                Ok(_) if token.is_cancelled() => Err(CompressionError::Cancelled),
                other => other,
            };

            match result {
                Ok(CompressedOutput { bytes, passthrough }) => {
                    let final_size = bytes.len() as u64;
                    let record = AttachmentRecord {
                        id,
                        name,
                        mime_class,
                        original_size,
                        final_size,
                        passthrough,
                    };
                    *output.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some((record, bytes));
                    tx.send_modify(|snap| {
                        snap.state = AttachmentState::Compressed;
                        snap.progress_percent = 100;
                        snap.final_size = Some(final_size);
                    });
                    metrics::counter!("ombud_attachments_compressed_total").increment(1);
                    info!(attachment = %id, final_size, passthrough, "attachment compressed");
                }
                Err(CompressionError::Cancelled) => {
                    if stalled.load(Ordering::SeqCst) {
                        let reason = format!("no progress for {quiet_period:?}");
                        tx.send_modify(|snap| {
                            snap.state = AttachmentState::Failed;
                            snap.error = Some(reason.clone());
                        });
                        metrics::counter!("ombud_attachments_failed_total").increment(1);
                        warn!(attachment = %id, %reason, "attachment failed");
                    } else {
                        tx.send_modify(|snap| {
                            snap.state = AttachmentState::Cancelled;
                        });
                        metrics::counter!("ombud_attachments_cancelled_total").increment(1);
                        info!(attachment = %id, "attachment cancelled");
                    }
                }
                Err(CompressionError::Failed(reason)) => {
                    tx.send_modify(|snap| {
                        snap.state = AttachmentState::Failed;
                        snap.error = Some(reason.clone());
                    });
                    metrics::counter!("ombud_attachments_failed_total").increment(1);
                    warn!(attachment = %id, %reason, "attachment failed");
                }
            }
        });
    }

    /// Requests cancellation of a running job. Settled jobs are left
    /// untouched; cancelling them is a no-op.
    pub fn cancel(&self, id: AttachmentId) -> Result<(), MediationError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get(&id)
            .ok_or_else(|| MediationError::NotFound(format!("attachment {id}")))?;
        if job.rx.borrow().state.is_terminal() {
            debug!(attachment = %id, "cancel after settlement, ignoring");
            return Ok(());
        }
        job.token.cancel();
        Ok(())
    }

    /// The latest snapshot for a job.
    pub fn snapshot(&self, id: AttachmentId) -> Result<AttachmentSnapshot, MediationError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&id)
            .map(|job| job.rx.borrow().clone())
            .ok_or_else(|| MediationError::NotFound(format!("attachment {id}")))
    }

    /// A live watch handle for a job, for callers that joined after
    /// submission.
    pub fn handle(&self, id: AttachmentId) -> Result<AttachmentHandle, MediationError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&id)
            .map(|job| AttachmentHandle {
                id,
                rx: job.rx.clone(),
            })
            .ok_or_else(|| MediationError::NotFound(format!("attachment {id}")))
    }

    /// Hands over the compressed output and retires the job. Only legal
    /// once the job is `Compressed`; the error names what actually
    /// happened otherwise.
    pub fn take_output(
        &self,
        id: AttachmentId,
    ) -> Result<(AttachmentRecord, Vec<u8>), MediationError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get(&id)
            .ok_or_else(|| MediationError::NotFound(format!("attachment {id}")))?;
        let snap = job.rx.borrow().clone();
        match snap.state {
            AttachmentState::Compressed => {
                let taken = job
                    .output
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match taken {
                    Some(pair) => {
                        jobs.remove(&id);
                        Ok(pair)
                    }
                    // Committed state without output means it was taken
                    // under a race; treat as gone.
                    None => Err(MediationError::NotFound(format!("attachment {id}"))),
                }
            }
            AttachmentState::Cancelled => Err(MediationError::Cancelled {
                attachment: id.to_string(),
            }),
            AttachmentState::Failed => Err(MediationError::CompressionFailed {
                attachment: id.to_string(),
                reason: snap.error.unwrap_or_else(|| "unknown".into()),
            }),
            state => Err(MediationError::InvalidState {
                entity: id.to_string(),
                current: state.to_string(),
                operation: "take_output".into(),
                terminal: false,
            }),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
