//! Transfer requests: a bartender's claim on main-store stock
//!
//! ```text
//! pending ──accept──► accepted ──mark_reached──► fulfilled
//!    │                   │
//!    └──reject──► rejected ◄──reject──┘
//!
//! pending | accepted | rejected ──cancel──► cancelled
//! ```
//!
//! Stock moves only on `mark_reached`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::inventory::fulfilled_request_marker;
use super::user::{Caller, Role};
use crate::error::{DomainError, DomainResult};

/// Status of a transfer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Accepted,
    Rejected,
    Fulfilled,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Accepted => "accepted",
            TransferStatus::Rejected => "rejected",
            TransferStatus::Fulfilled => "fulfilled",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

/// A bartender's request for stock from the main store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct TransferRequest {
    pub id: Uuid,
    pub product_id: Uuid,
    pub qty: Decimal,
    pub qty_unit_id: Uuid,
    pub status: TransferStatus,
    pub requester_id: Uuid,
    pub responder_id: Option<Uuid>,
    pub branch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    /// Mirrors `status == fulfilled`; kept for clients that read the flag
    pub reached_status: bool,
    pub notes: Option<String>,
}

/// A transition requested on an existing transfer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAction {
    Accept,
    Reject { reason: Option<String> },
    MarkReached,
    Cancel,
}

impl TransferAction {
    /// Map a requested wire status onto an action
    pub fn from_status(status: TransferStatus, reason: Option<String>) -> DomainResult<Self> {
        match status {
            TransferStatus::Accepted => Ok(TransferAction::Accept),
            TransferStatus::Rejected => Ok(TransferAction::Reject { reason }),
            TransferStatus::Fulfilled => Ok(TransferAction::MarkReached),
            TransferStatus::Cancelled => Ok(TransferAction::Cancel),
            TransferStatus::Pending => Err(DomainError::validation(
                "status",
                "A request cannot be moved back to pending",
            )),
        }
    }
}

/// What the caller should do after a transition check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Persist the new status
    MoveTo(TransferStatus),
    /// Already in the target state; nothing to write
    Unchanged,
}

/// What reaching an accepted request does to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fulfilment {
    /// Move the requested stock, tagging its transaction with `marker`
    MoveStock { marker: String },
    /// A ledger transaction already carries this request's marker
    AlreadyRecorded,
}

/// Only bartenders of the branch may request stock
pub fn check_can_request(caller: &dyn Caller, branch_id: Uuid) -> DomainResult<()> {
    if caller.caller_role() != Role::Bartender {
        return Err(DomainError::Forbidden(
            "Only bartenders can request stock transfers".to_string(),
        ));
    }
    if caller.caller_branch() != Some(branch_id) {
        return Err(DomainError::Forbidden(
            "Bartenders can only request stock from their own branch".to_string(),
        ));
    }
    Ok(())
}

impl TransferRequest {
    /// Validate `action` for `caller` against the current status.
    /// Permission is checked before state, so a forbidden caller never learns
    /// more than that it is forbidden.
    pub fn check_transition(
        &self,
        caller: &dyn Caller,
        action: &TransferAction,
    ) -> DomainResult<TransferOutcome> {
        match action {
            TransferAction::Accept => {
                self.require_manager(caller)?;
                match self.status {
                    TransferStatus::Pending => Ok(TransferOutcome::MoveTo(TransferStatus::Accepted)),
                    other => Err(self.invalid("accept", other)),
                }
            }
            TransferAction::Reject { .. } => {
                self.require_manager(caller)?;
                match self.status {
                    TransferStatus::Pending | TransferStatus::Accepted => {
                        Ok(TransferOutcome::MoveTo(TransferStatus::Rejected))
                    }
                    other => Err(self.invalid("reject", other)),
                }
            }
            TransferAction::MarkReached => {
                self.require_requester(caller, "mark it as reached")?;
                match self.status {
                    TransferStatus::Accepted => Ok(TransferOutcome::MoveTo(TransferStatus::Fulfilled)),
                    TransferStatus::Fulfilled => Ok(TransferOutcome::Unchanged),
                    other => Err(self.invalid("mark as reached", other)),
                }
            }
            TransferAction::Cancel => {
                self.require_requester(caller, "cancel it")?;
                match self.status {
                    TransferStatus::Pending | TransferStatus::Accepted | TransferStatus::Rejected => {
                        Ok(TransferOutcome::MoveTo(TransferStatus::Cancelled))
                    }
                    TransferStatus::Cancelled => Ok(TransferOutcome::Unchanged),
                    other => Err(self.invalid("cancel", other)),
                }
            }
        }
    }

    /// Apply a checked status, keeping `reached_status` in step with it
    pub fn apply(&mut self, status: TransferStatus, responder: Option<Uuid>, at: DateTime<Utc>) {
        if matches!(status, TransferStatus::Accepted | TransferStatus::Rejected) {
            self.responder_id = responder;
            self.responded_at = Some(at);
        }
        self.status = status;
        self.reached_status = status == TransferStatus::Fulfilled;
    }

    /// Decide whether reaching this request still has to move stock, given
    /// the notes of ledger transactions that may carry its marker
    pub fn fulfilment<'a, I>(&self, ledger_notes: I) -> Fulfilment
    where
        I: IntoIterator<Item = &'a str>,
    {
        let marker = fulfilled_request_marker(self.id);
        if ledger_notes.into_iter().any(|note| note.contains(&marker)) {
            Fulfilment::AlreadyRecorded
        } else {
            Fulfilment::MoveStock { marker }
        }
    }

    /// Append a manager's rejection reason to the requester's notes
    pub fn record_rejection(&mut self, reason: &str) {
        let reason = reason.trim();
        if reason.is_empty() {
            return;
        }
        self.notes = Some(match self.notes.as_deref().map(str::trim) {
            Some(notes) if !notes.is_empty() => format!("{}\nRejected: {}", notes, reason),
            _ => format!("Rejected: {}", reason),
        });
    }

    fn require_manager(&self, caller: &dyn Caller) -> DomainResult<()> {
        if caller.manages_branch(self.branch_id) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(
                "Only a manager of the request's branch can respond to it".to_string(),
            ))
        }
    }

    fn require_requester(&self, caller: &dyn Caller, what: &str) -> DomainResult<()> {
        if caller.caller_id() == self.requester_id {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!(
                "Only the bartender who made the request can {}",
                what
            )))
        }
    }

    fn invalid(&self, verb: &str, status: TransferStatus) -> DomainError {
        DomainError::InvalidState(format!(
            "Cannot {} a request that is {}",
            verb,
            status.as_str()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::StaticCaller;

    fn request(bartender: &StaticCaller, status: TransferStatus) -> TransferRequest {
        TransferRequest {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            qty: Decimal::from(2),
            qty_unit_id: Uuid::new_v4(),
            status,
            requester_id: bartender.id,
            responder_id: None,
            branch_id: bartender.branch_id.unwrap(),
            created_at: Utc::now(),
            responded_at: None,
            reached_status: false,
            notes: None,
        }
    }

    #[test]
    fn test_only_branch_bartenders_can_request() {
        let branch = Uuid::new_v4();
        assert!(check_can_request(&StaticCaller::new(Role::Bartender, branch), branch).is_ok());
        assert!(matches!(
            check_can_request(&StaticCaller::new(Role::Waiter, branch), branch),
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            check_can_request(&StaticCaller::new(Role::Bartender, Uuid::new_v4()), branch),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn test_manager_accepts_pending() {
        let branch = Uuid::new_v4();
        let bartender = StaticCaller::new(Role::Bartender, branch);
        let manager = StaticCaller::new(Role::Manager, branch);
        let req = request(&bartender, TransferStatus::Pending);
        assert_eq!(
            req.check_transition(&manager, &TransferAction::Accept).unwrap(),
            TransferOutcome::MoveTo(TransferStatus::Accepted)
        );
    }

    #[test]
    fn test_other_branch_manager_is_forbidden() {
        let bartender = StaticCaller::new(Role::Bartender, Uuid::new_v4());
        let manager = StaticCaller::new(Role::Manager, Uuid::new_v4());
        let req = request(&bartender, TransferStatus::Pending);
        assert!(matches!(
            req.check_transition(&manager, &TransferAction::Accept),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn test_accepting_twice_is_invalid_state() {
        let branch = Uuid::new_v4();
        let bartender = StaticCaller::new(Role::Bartender, branch);
        let manager = StaticCaller::new(Role::Manager, branch);
        let req = request(&bartender, TransferStatus::Accepted);
        assert!(matches!(
            req.check_transition(&manager, &TransferAction::Accept),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn test_mark_reached_requires_requester_and_acceptance() {
        let branch = Uuid::new_v4();
        let bartender = StaticCaller::new(Role::Bartender, branch);
        let other = StaticCaller::new(Role::Bartender, branch);

        let pending = request(&bartender, TransferStatus::Pending);
        assert!(matches!(
            pending.check_transition(&bartender, &TransferAction::MarkReached),
            Err(DomainError::InvalidState(_))
        ));

        let accepted = request(&bartender, TransferStatus::Accepted);
        assert!(matches!(
            accepted.check_transition(&other, &TransferAction::MarkReached),
            Err(DomainError::Forbidden(_))
        ));
        assert_eq!(
            accepted
                .check_transition(&bartender, &TransferAction::MarkReached)
                .unwrap(),
            TransferOutcome::MoveTo(TransferStatus::Fulfilled)
        );

        let fulfilled = request(&bartender, TransferStatus::Fulfilled);
        assert_eq!(
            fulfilled
                .check_transition(&bartender, &TransferAction::MarkReached)
                .unwrap(),
            TransferOutcome::Unchanged
        );
    }

    #[test]
    fn test_reject_from_accepted_and_cancel_after_reject() {
        let branch = Uuid::new_v4();
        let bartender = StaticCaller::new(Role::Bartender, branch);
        let manager = StaticCaller::new(Role::Manager, branch);

        let accepted = request(&bartender, TransferStatus::Accepted);
        assert_eq!(
            accepted
                .check_transition(&manager, &TransferAction::Reject { reason: None })
                .unwrap(),
            TransferOutcome::MoveTo(TransferStatus::Rejected)
        );

        let rejected = request(&bartender, TransferStatus::Rejected);
        assert_eq!(
            rejected.check_transition(&bartender, &TransferAction::Cancel).unwrap(),
            TransferOutcome::MoveTo(TransferStatus::Cancelled)
        );

        let fulfilled = request(&bartender, TransferStatus::Fulfilled);
        assert!(fulfilled
            .check_transition(&bartender, &TransferAction::Cancel)
            .is_err());
    }

    #[test]
    fn test_apply_keeps_reached_flag_in_step() {
        let branch = Uuid::new_v4();
        let bartender = StaticCaller::new(Role::Bartender, branch);
        let manager = StaticCaller::new(Role::Manager, branch);
        let mut req = request(&bartender, TransferStatus::Pending);

        req.apply(TransferStatus::Accepted, Some(manager.id), Utc::now());
        assert_eq!(req.responder_id, Some(manager.id));
        assert!(req.responded_at.is_some());
        assert!(!req.reached_status);

        req.apply(TransferStatus::Fulfilled, None, Utc::now());
        assert!(req.reached_status);
        assert_eq!(req.responder_id, Some(manager.id));
    }

    #[test]
    fn test_pending_is_not_a_requestable_transition() {
        assert!(TransferAction::from_status(TransferStatus::Pending, None).is_err());
        assert_eq!(
            TransferAction::from_status(TransferStatus::Fulfilled, None).unwrap(),
            TransferAction::MarkReached
        );
    }

    #[test]
    fn test_fulfilment_moves_stock_once() {
        let bartender = StaticCaller::new(Role::Bartender, Uuid::new_v4());
        let req = request(&bartender, TransferStatus::Accepted);
        let other = request(&bartender, TransferStatus::Accepted);

        let marker = match req.fulfilment(["Opening stock"]) {
            Fulfilment::MoveStock { marker } => marker,
            Fulfilment::AlreadyRecorded => panic!("nothing recorded yet"),
        };
        assert_eq!(marker, fulfilled_request_marker(req.id));

        let notes = vec![format!("Store to bartender. {}", marker)];
        assert_eq!(
            req.fulfilment(notes.iter().map(String::as_str)),
            Fulfilment::AlreadyRecorded
        );
        assert!(matches!(
            other.fulfilment(notes.iter().map(String::as_str)),
            Fulfilment::MoveStock { .. }
        ));
    }

    #[test]
    fn test_rejection_keeps_requester_notes() {
        let bartender = StaticCaller::new(Role::Bartender, Uuid::new_v4());
        let mut req = request(&bartender, TransferStatus::Pending);
        req.notes = Some("For the Friday event".to_string());
        req.record_rejection("Store is short this week");
        assert_eq!(
            req.notes.as_deref(),
            Some("For the Friday event\nRejected: Store is short this week")
        );

        let mut bare = request(&bartender, TransferStatus::Pending);
        bare.record_rejection("  ");
        assert_eq!(bare.notes, None);
        bare.record_rejection("Duplicate");
        assert_eq!(bare.notes.as_deref(), Some("Rejected: Duplicate"));
    }
}
