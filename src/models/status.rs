use std::fmt::{Display, Formatter, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    NotFound,
    Processing,
    Sent,
    Failed,
}

impl IdempotencyStatus {
    pub fn from_str_value(value: Option<&str>) -> Self {
        match value {
            Some("processing") => IdempotencyStatus::Processing,
            Some("sent") => IdempotencyStatus::Sent,
            Some("failed") => IdempotencyStatus::Failed,
            _ => IdempotencyStatus::NotFound,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::NotFound => "not_found",
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Sent => "sent",
            IdempotencyStatus::Failed => "failed",
        }
    }
}

/// What the consumer did with a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Sent and acknowledged.
    Acked,
    /// Already sent on an earlier delivery; acknowledged without sending.
    Duplicate,
    /// Poison message; acknowledged and discarded.
    Dropped { reason: String },
    /// Transient failure; negatively acknowledged with requeue.
    Requeued { attempt: u32 },
    /// Moved to the dead-letter queue and acknowledged.
    DeadLettered { attempt: u32, reason: String },
}

impl Display for Disposition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Disposition::Acked => write!(f, "acked"),
            Disposition::Duplicate => write!(f, "duplicate"),
            Disposition::Dropped { .. } => write!(f, "dropped"),
            Disposition::Requeued { .. } => write!(f, "requeued"),
            Disposition::DeadLettered { .. } => write!(f, "dead_lettered"),
        }
    }
}
