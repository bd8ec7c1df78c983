//! End-to-end behavior of the attachment processor: cancellation races,
//! the stall watchdog, and progress reporting through the handle.

use std::sync::{mpsc, Mutex};
use std::time::Duration;

use ombud_core::{AttachmentId, MediationError};
use ombud_media::{
    AttachmentProcessor, AttachmentState, CompressedOutput, CompressionError, CompressionStrategy,
    JobCtl, MediaPolicy, SourceFile,
};

fn doc(bytes: Vec<u8>) -> SourceFile {
    SourceFile {
        id: AttachmentId::new(),
        name: "evidence.pdf".into(),
        mime_type: "application/pdf".into(),
        bytes,
        duration_secs: None,
    }
}

/// Finishes its work, then parks on a gate before returning. Lets tests
/// land a cancel after compression is effectively done.
struct GatedStrategy {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl CompressionStrategy for GatedStrategy {
    fn compress(
        &self,
        source: &SourceFile,
        ctl: &JobCtl,
    ) -> Result<CompressedOutput, CompressionError> {
        ctl.report(99);
        let _ = self.gate.lock().unwrap().recv();
        // No checkpoint here on purpose: the strategy believes it
        // finished. The processor's final token check decides.
        Ok(CompressedOutput {
            bytes: source.bytes.clone(),
            passthrough: true,
        })
    }
}

/// Never reports progress, only polls for cancellation.
struct SilentStrategy;

impl CompressionStrategy for SilentStrategy {
    fn compress(
        &self,
        source: &SourceFile,
        ctl: &JobCtl,
    ) -> Result<CompressedOutput, CompressionError> {
        loop {
            std::thread::sleep(Duration::from_millis(5));
            ctl.checkpoint()?;
            // Unreachable in practice; the watchdog fires first.
            if source.bytes.is_empty() {
                return Ok(CompressedOutput {
                    bytes: Vec::new(),
                    passthrough: true,
                });
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_wins_over_near_complete_job() {
    let (release, gate) = mpsc::channel();
    let proc = AttachmentProcessor::new(MediaPolicy::default());
    let mut handle = proc
        .submit_with_strategy(doc(vec![0u8; 128]), Box::new(GatedStrategy { gate: Mutex::new(gate) }))
        .unwrap();

    // Wait for the worker to reach the gate (progress 99), then cancel
    // while the finished output is still in flight.
    loop {
        if handle.snapshot().progress_percent >= 99 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    proc.cancel(handle.id()).unwrap();
    release.send(()).unwrap();

    let snap = handle.wait_terminal().await;
    assert_eq!(snap.state, AttachmentState::Cancelled);

    let err = proc.take_output(handle.id()).unwrap_err();
    assert!(matches!(err, MediationError::Cancelled { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stall_watchdog_marks_failed() {
    let policy = MediaPolicy {
        quiet_period: Duration::from_millis(50),
        ..MediaPolicy::default()
    };
    let proc = AttachmentProcessor::new(policy);
    let mut handle = proc
        .submit_with_strategy(doc(vec![0u8; 16]), Box::new(SilentStrategy))
        .unwrap();

    let snap = handle.wait_terminal().await;
    assert_eq!(snap.state, AttachmentState::Failed);
    assert!(snap.error.unwrap().contains("no progress"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_progress_is_monotonic_and_completes() {
    let policy = MediaPolicy {
        chunk_size: 32,
        ..MediaPolicy::default()
    };
    let proc = AttachmentProcessor::new(policy);
    let mut handle = proc.submit(doc(vec![0u8; 1024])).unwrap();

    let mut last = 0u8;
    loop {
        let snap = handle.snapshot();
        assert!(snap.progress_percent >= last);
        last = snap.progress_percent;
        if snap.state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let snap = handle.wait_terminal().await;
    assert_eq!(snap.state, AttachmentState::Compressed);
    assert_eq!(snap.progress_percent, 100);
    assert_eq!(snap.final_size, Some(1024));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_attachment_does_not_disturb_others() {
    let proc = AttachmentProcessor::new(MediaPolicy::default());

    let mut bad = proc
        .submit(SourceFile {
            id: AttachmentId::new(),
            name: "broken.png".into(),
            mime_type: "image/png".into(),
            bytes: vec![0xde, 0xad],
            duration_secs: None,
        })
        .unwrap();
    let mut good = proc.submit(doc(vec![7u8; 256])).unwrap();

    assert_eq!(bad.wait_terminal().await.state, AttachmentState::Failed);
    assert_eq!(good.wait_terminal().await.state, AttachmentState::Compressed);

    let (record, bytes) = proc.take_output(good.id()).unwrap();
    assert_eq!(bytes.len(), 256);
    assert_eq!(record.final_size, 256);
}
