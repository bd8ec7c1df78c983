//! # Application State
//!
//! Shared state for the Axum application: the dispute lifecycle engine,
//! the room manager, and the attachment processor, all behind `Arc` so
//! the state clones cheaply per request.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use ombud_core::{Authorizer, GrantAuthorizer, OrderId};
use ombud_dispute::{
    CollaboratorError, DisputeLifecycle, NoopNotifier, OrderCollaborator, OrderStatus,
    OrderStatusOutcome,
};
use ombud_media::{AttachmentProcessor, MediaPolicy};
use ombud_room::{
    AttachmentStore, InMemoryAttachmentStore, InMemoryMessageStore, RealtimeChannel, RoomManager,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// The dispute transition engine.
    pub lifecycle: Arc<DisputeLifecycle>,
    /// Active mediation rooms.
    pub rooms: Arc<RoomManager>,
    /// Attachment compression jobs.
    pub processor: Arc<AttachmentProcessor>,
    /// Compressed attachment payloads, for downloads.
    pub attachments: Arc<dyn AttachmentStore>,
}

impl AppState {
    /// Wire a state from already-built services.
    pub fn new(
        lifecycle: Arc<DisputeLifecycle>,
        rooms: Arc<RoomManager>,
        processor: Arc<AttachmentProcessor>,
        attachments: Arc<dyn AttachmentStore>,
    ) -> Self {
        Self {
            lifecycle,
            rooms,
            processor,
            attachments,
        }
    }

    /// Fully in-process wiring: grant-backed authorization, in-memory
    /// message and blob stores, and a process-local order ledger.
    /// Deployments with a real order service swap in their own
    /// collaborators via [`AppState::new`].
    pub fn in_memory() -> Self {
        let authorizer: Arc<dyn Authorizer> = Arc::new(GrantAuthorizer);
        let lifecycle = Arc::new(DisputeLifecycle::new(
            authorizer.clone(),
            Arc::new(InProcessOrders::default()),
            Arc::new(NoopNotifier),
        ));
        let processor = Arc::new(AttachmentProcessor::new(MediaPolicy::from_env()));
        let attachments: Arc<dyn AttachmentStore> = Arc::new(InMemoryAttachmentStore::new());
        let rooms = Arc::new(RoomManager::new(
            Arc::new(InMemoryMessageStore::new()),
            attachments.clone(),
            Arc::new(RealtimeChannel::new()),
            lifecycle.clone(),
            processor.clone(),
            authorizer,
        ));
        Self::new(lifecycle, rooms, processor, attachments)
    }
}

/// Process-local order collaborator.
///
/// Tracks each order's last status so repeat updates report
/// `AlreadySet`, matching the idempotency contract real order services
/// must honor.
#[derive(Default)]
pub struct InProcessOrders {
    statuses: RwLock<HashMap<OrderId, OrderStatus>>,
}

impl OrderCollaborator for InProcessOrders {
    fn set_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusOutcome, CollaboratorError> {
        let mut statuses = self.statuses.write().unwrap_or_else(PoisonError::into_inner);
        if statuses.get(&order_id) == Some(&status) {
            return Ok(OrderStatusOutcome::AlreadySet);
        }
        statuses.insert(order_id, status);
        info!(order = %order_id, status = %status, "order status updated");
        Ok(OrderStatusOutcome::Updated)
    }
}
