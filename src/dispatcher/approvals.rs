//! Approval tickets for page requests that need a user decision.
//!
//! ```text
//! Received ─► PopupOpened ─► AwaitingUserDecision ─┬─► Approved ─► Executed
//!                                                  └─► Rejected
//! ```
//!
//! A popup's answer is only relayed when it matches an open ticket for the
//! same origin, tab and request kind.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{VaultError, VaultResult};
use crate::protocol::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientRequestState {
    Received,
    PopupOpened,
    AwaitingUserDecision,
    Approved,
    Rejected,
    Executed,
}

impl ClientRequestState {
    fn can_move_to(self, next: ClientRequestState) -> bool {
        use ClientRequestState::*;
        matches!(
            (self, next),
            (Received, PopupOpened)
                | (PopupOpened, AwaitingUserDecision)
                | (AwaitingUserDecision, Approved)
                | (AwaitingUserDecision, Rejected)
                | (Approved, Executed)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: u64,
    pub origin: String,
    pub tab_id: i64,
    /// The page request type that opened the ticket.
    pub kind: MessageType,
    pub state: ClientRequestState,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Approvals {
    inner: Mutex<ApprovalsInner>,
}

#[derive(Debug, Default)]
struct ApprovalsInner {
    next_id: u64,
    tickets: Vec<Ticket>,
}

fn poisoned() -> VaultError {
    VaultError::Storage("approvals lock poisoned".into())
}

impl Approvals {
    pub fn new() -> Self { Self::default() }

    pub fn open(&self, origin: &str, tab_id: i64, kind: MessageType) -> VaultResult<u64> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.tickets.push(Ticket {
            id,
            origin: origin.to_string(),
            tab_id,
            kind,
            state: ClientRequestState::Received,
            opened_at: Utc::now(),
        });
        Ok(id)
    }

    pub fn advance(&self, id: u64, next: ClientRequestState) -> VaultResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let ticket = inner
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| VaultError::validation(format!("no approval ticket {id}")))?;
        if !ticket.state.can_move_to(next) {
            return Err(VaultError::validation(format!(
                "approval ticket {id} cannot move from {:?} to {next:?}",
                ticket.state
            )));
        }
        ticket.state = next;
        if matches!(next, ClientRequestState::Rejected | ClientRequestState::Executed) {
            inner.tickets.retain(|t| t.id != id);
        }
        Ok(())
    }

    /// Oldest ticket awaiting a decision for this origin, tab and request kind.
    pub fn awaiting(&self, origin: &str, tab_id: i64, kind: MessageType) -> VaultResult<Option<Ticket>> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner
            .tickets
            .iter()
            .find(|t| {
                t.origin == origin
                    && t.tab_id == tab_id
                    && t.kind == kind
                    && t.state == ClientRequestState::AwaitingUserDecision
            })
            .cloned())
    }

    pub fn discard(&self, id: u64) -> VaultResult<()> {
        self.inner.lock().map_err(|_| poisoned())?.tickets.retain(|t| t.id != id);
        Ok(())
    }

    pub fn clear(&self) -> VaultResult<()> {
        self.inner.lock().map_err(|_| poisoned())?.tickets.clear();
        Ok(())
    }

    pub fn pending(&self) -> VaultResult<Vec<Ticket>> {
        Ok(self.inner.lock().map_err(|_| poisoned())?.tickets.clone())
    }
}
