//! Host decision round-trips
//!
//! Approval requests and questions from tools are posted to the host as
//! `HostRequest`s and parked in a pending table keyed by request id. The
//! host answers later with an explicit decision. Dropping a pending entry
//! (abandon, host gone) resolves it as a rejection / empty answer.

use crate::tool::ToolHost;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("No pending request with id {0}")]
    UnknownRequest(Uuid),
}

/// An action waiting for the host's approval
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub description: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// A question waiting for the user's answer
#[derive(Debug, Clone, Serialize)]
pub struct QuestionRequest {
    pub id: Uuid,
    pub question: String,
}

/// What the host is asked to handle
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRequest {
    Approval(ApprovalRequest),
    Question(QuestionRequest),
    Progress {
        step: usize,
        total: usize,
        description: String,
    },
}

/// Requests awaiting a reply, keyed by id
pub struct PendingTable<T> {
    entries: Mutex<HashMap<Uuid, oneshot::Sender<T>>>,
}

impl<T> Default for PendingTable<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> PendingTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a new request and return its id and the receiver for the reply
    pub fn open(&self) -> (Uuid, oneshot::Receiver<T>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(id, tx);
        (id, rx)
    }

    /// Deliver the reply for `id`
    pub fn resolve(&self, id: Uuid, value: T) -> Result<(), ApprovalError> {
        let sender = self
            .entries
            .lock()
            .remove(&id)
            .ok_or(ApprovalError::UnknownRequest(id))?;
        // The waiting side may have gone away; nothing to deliver to then
        let _ = sender.send(value);
        Ok(())
    }

    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.entries.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every pending entry; waiters see their sender closed
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

pub type PendingApprovals = PendingTable<bool>;

/// `ToolHost` that forwards requests over a channel and waits for explicit
/// decisions delivered through `resolve_approval` / `answer_question`.
pub struct ChannelHost {
    requests: mpsc::UnboundedSender<HostRequest>,
    approvals: PendingApprovals,
    questions: PendingTable<String>,
}

impl ChannelHost {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<HostRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Arc::new(Self {
            requests: tx,
            approvals: PendingTable::new(),
            questions: PendingTable::new(),
        });
        (host, rx)
    }

    pub fn resolve_approval(&self, id: Uuid, approved: bool) -> Result<(), ApprovalError> {
        tracing::debug!(request_id = %id, approved, "Approval resolved");
        self.approvals.resolve(id, approved)
    }

    pub fn answer_question(&self, id: Uuid, answer: impl Into<String>) -> Result<(), ApprovalError> {
        self.questions.resolve(id, answer.into())
    }

    pub fn pending_approvals(&self) -> Vec<Uuid> {
        self.approvals.pending_ids()
    }

    /// Reject every pending approval and leave every question unanswered
    pub fn abandon_all(&self) {
        self.approvals.clear();
        self.questions.clear();
    }
}

#[async_trait]
impl ToolHost for ChannelHost {
    async fn ask_user(&self, question: &str) -> String {
        let (id, rx) = self.questions.open();
        let request = HostRequest::Question(QuestionRequest {
            id,
            question: question.to_string(),
        });
        if self.requests.send(request).is_err() {
            tracing::warn!(request_id = %id, "Host is gone, leaving question unanswered");
            let _ = self.questions.resolve(id, String::new());
            return String::new();
        }
        rx.await.unwrap_or_default()
    }

    fn report_progress(&self, step: usize, total: usize, description: &str) {
        let _ = self.requests.send(HostRequest::Progress {
            step,
            total,
            description: description.to_string(),
        });
    }

    async fn request_approval(
        &self,
        description: &str,
        details: &str,
        diff: Option<&str>,
    ) -> bool {
        let (id, rx) = self.approvals.open();
        let request = HostRequest::Approval(ApprovalRequest {
            id,
            description: description.to_string(),
            details: details.to_string(),
            diff: diff.map(str::to_string),
        });
        if self.requests.send(request).is_err() {
            tracing::warn!(request_id = %id, "Host is gone, rejecting approval");
            let _ = self.approvals.resolve(id, false);
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// Host that approves everything and answers questions with an empty string.
/// For tests and unattended runs.
pub struct AutoApprove;

#[async_trait]
impl ToolHost for AutoApprove {
    async fn ask_user(&self, _question: &str) -> String {
        String::new()
    }

    fn report_progress(&self, _step: usize, _total: usize, _description: &str) {}

    async fn request_approval(
        &self,
        _description: &str,
        _details: &str,
        _diff: Option<&str>,
    ) -> bool {
        true
    }
}

/// Wraps another host, approving every action without asking it.
/// Questions and progress still go to the wrapped host.
pub struct AutoApproving {
    inner: Arc<dyn ToolHost>,
}

impl AutoApproving {
    pub fn new(inner: Arc<dyn ToolHost>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ToolHost for AutoApproving {
    async fn ask_user(&self, question: &str) -> String {
        self.inner.ask_user(question).await
    }

    fn report_progress(&self, step: usize, total: usize, description: &str) {
        self.inner.report_progress(step, total, description);
    }

    async fn request_approval(
        &self,
        description: &str,
        _details: &str,
        _diff: Option<&str>,
    ) -> bool {
        tracing::debug!(description, "Auto-approved");
        true
    }
}
