//! # ombud-media — Attachment Processing
//!
//! Turns a raw file selected by a chat participant into a deliverable
//! attachment: compressed bytes plus metadata, produced by a cancellable
//! background worker that reports progress as it goes.
//!
//! ## State Machine (per attachment)
//!
//! ```text
//! Pending ──▶ Compressing ──▶ Compressed
//!                  │
//!                  ├─────────▶ Cancelled   (owner requested)
//!                  └─────────▶ Failed      (codec error, caps, stall)
//! ```
//!
//! - **Cancellation** (`cancel.rs`): a cooperative token checked at
//!   defined checkpoints inside the compression loop — never an OS-level
//!   kill, so buffers are released cleanly.
//! - **Classification** (`classify.rs`): mime type → one of four classes.
//! - **Strategies** (`strategy.rs`): per-class compression with a
//!   never-grow guarantee (small files pass through unchanged).
//! - **Processor** (`processor.rs`): one worker task per attachment,
//!   watch-channel progress snapshots, stall watchdog, output hand-off.
//!
//! ## Crate Policy
//!
//! - Depends only on `ombud-core` internally.
//! - An attachment is owned by the submitting session until its output is
//!   taken; nothing here is shared with other participants.

pub mod cancel;
pub mod classify;
pub mod processor;
pub mod strategy;

pub use cancel::CancelToken;
pub use classify::MimeClass;
pub use processor::{
    AttachmentHandle, AttachmentProcessor, AttachmentRecord, AttachmentSnapshot, AttachmentState,
};
pub use strategy::{
    strategy_for, CompressedOutput, CompressionError, CompressionStrategy, JobCtl, MediaPolicy,
    SourceFile,
};
