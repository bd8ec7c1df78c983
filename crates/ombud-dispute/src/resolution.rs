//! # Resolution Actions
//!
//! The actions a mediator can issue against a dispute, with their note
//! requirements and order-status side effects.
//!
//! | Action               | Dispute →    | Order →     | Note        |
//! |----------------------|--------------|-------------|-------------|
//! | `refund_client`      | `resolved`   | `refunded`  | required    |
//! | `release_provider`   | `resolved`   | `completed` | required    |
//! | `dismiss`            | `resolved`   | —           | defaulted   |
//! | `cancel_dispute`     | `cancelled`  | —           | defaulted   |
//! | `change_meeting_date`| *(unchanged)*| —           | date string |
//!
//! `change_meeting_date` is the outlier: it rewrites the structured
//! meeting request without touching dispute status. Confirming a meeting
//! (`dismiss`) closes the case while rescheduling does not; that
//! asymmetry is the observed production behavior and is kept as-is.

use serde::{Deserialize, Serialize};

use crate::dispute::DisputeStatus;

/// The status the external order collaborator is asked to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The client is refunded.
    Refunded,
    /// The provider is paid out; the order completes.
    Completed,
}

impl OrderStatus {
    /// The wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refunded => "refunded",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mediator's resolution action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Side with the client: refund the order.
    RefundClient,
    /// Side with the provider: release payment, complete the order.
    ReleaseProvider,
    /// Close the case without a financial side effect.
    Dismiss,
    /// Cancel the dispute itself.
    CancelDispute,
    /// Rewrite the meeting request date; dispute status is untouched.
    ChangeMeetingDate,
}

impl ResolutionAction {
    /// The wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefundClient => "refund_client",
            Self::ReleaseProvider => "release_provider",
            Self::Dismiss => "dismiss",
            Self::CancelDispute => "cancel_dispute",
            Self::ChangeMeetingDate => "change_meeting_date",
        }
    }

    /// Parse an action from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refund_client" => Some(Self::RefundClient),
            "release_provider" => Some(Self::ReleaseProvider),
            "dismiss" => Some(Self::Dismiss),
            "cancel_dispute" => Some(Self::CancelDispute),
            "change_meeting_date" => Some(Self::ChangeMeetingDate),
            _ => None,
        }
    }

    /// Whether this action requires a non-empty mediator note.
    ///
    /// Financial outcomes must be justified in writing; dismissal and
    /// cancellation fall back to a default note, and the meeting
    /// reschedule carries a date instead of a note.
    pub fn requires_note(&self) -> bool {
        matches!(self, Self::RefundClient | Self::ReleaseProvider)
    }

    /// The dispute status this action transitions to, if any.
    pub fn target_status(&self) -> Option<DisputeStatus> {
        match self {
            Self::RefundClient | Self::ReleaseProvider | Self::Dismiss => {
                Some(DisputeStatus::Resolved)
            }
            Self::CancelDispute => Some(DisputeStatus::Cancelled),
            Self::ChangeMeetingDate => None,
        }
    }

    /// The order status to request from the order collaborator, if any.
    pub fn order_status(&self) -> Option<OrderStatus> {
        match self {
            Self::RefundClient => Some(OrderStatus::Refunded),
            Self::ReleaseProvider => Some(OrderStatus::Completed),
            Self::Dismiss | Self::CancelDispute | Self::ChangeMeetingDate => None,
        }
    }

    /// The note recorded when the mediator supplies none.
    pub fn default_note(&self) -> Option<&'static str> {
        match self {
            Self::Dismiss => Some("dispute dismissed by mediator"),
            Self::CancelDispute => Some("dispute cancelled by mediator"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
