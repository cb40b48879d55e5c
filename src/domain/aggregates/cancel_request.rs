//! Cancel Request Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub requested_by: Uuid,
    pub reason: String,
    status: CancelRequestStatus,
    pub reviewer_id: Option<Uuid>,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelRequestStatus { #[default] Pending, Approved, Rejected }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction { Approve, Reject }

impl CancelRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Rejected => "rejected" }
    }
}

impl std::str::FromStr for CancelRequestStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown cancel request status {other}")),
        }
    }
}

impl CancelRequest {
    pub fn open(order_id: Uuid, requested_by: Uuid, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, requested_by, reason: reason.into(),
            status: CancelRequestStatus::Pending, reviewer_id: None, review_note: None,
            created_at: Utc::now(), resolved_at: None,
        }
    }

    /// Rehydrate from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, order_id: Uuid, requested_by: Uuid, reason: String, status: CancelRequestStatus,
        reviewer_id: Option<Uuid>, review_note: Option<String>, created_at: DateTime<Utc>,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self { id, order_id, requested_by, reason, status, reviewer_id, review_note, created_at, resolved_at }
    }

    pub fn status(&self) -> CancelRequestStatus { self.status }
    pub fn is_pending(&self) -> bool { self.status == CancelRequestStatus::Pending }

    /// Review is terminal; a resolved request cannot be reviewed again.
    pub fn resolve(&mut self, action: ReviewAction, reviewer_id: Uuid, note: Option<String>) -> Result<(), CancelRequestError> {
        if !self.is_pending() { return Err(CancelRequestError::AlreadyResolved(self.status)); }
        self.status = match action {
            ReviewAction::Approve => CancelRequestStatus::Approved,
            ReviewAction::Reject => CancelRequestStatus::Rejected,
        };
        self.reviewer_id = Some(reviewer_id);
        self.review_note = note;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelRequestError {
    #[error("Cancel request already {}", .0.as_str())]
    AlreadyResolved(CancelRequestStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_is_terminal() {
        let mut req = CancelRequest::open(Uuid::now_v7(), Uuid::now_v7(), "ordered wrong size");
        let admin = Uuid::now_v7();
        req.resolve(ReviewAction::Reject, admin, Some("already packed".into())).unwrap();
        assert_eq!(req.status(), CancelRequestStatus::Rejected);
        assert!(req.resolved_at.is_some());
        assert_eq!(
            req.resolve(ReviewAction::Approve, admin, None),
            Err(CancelRequestError::AlreadyResolved(CancelRequestStatus::Rejected))
        );
    }
}
