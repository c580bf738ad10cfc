//! Single-flight attempts with a timeout.
//!
//! An attempt is one outstanding request to the authority node on behalf of
//! a local actor: either using an interactable or picking up an object.
//! - **Idle → Pending** on `start`, only when idle
//! - **Pending → Resolved** when the matching reply arrives or the deadline passes
//! - **Resolved → Idle** right after the callback ran
//!
//! The callback passed to `start` runs exactly once, including when `start`
//! itself rejects the attempt or the coordinator is dropped mid-attempt.

use starport_types::{ObjectId, RequestId};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// What an attempt asks the authority node for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    Interact { gateway: ObjectId },
    Pickup { object: ObjectId },
}

impl AttemptKind {
    /// The object the reply will name.
    pub fn target(&self) -> ObjectId {
        match self {
            AttemptKind::Interact { gateway } => *gateway,
            AttemptKind::Pickup { object } => *object,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Another attempt was still pending.
    Busy,
    /// The local replica already shows the target as unavailable.
    Unavailable,
    /// No local actor has been assigned yet.
    NoActor,
    /// The authority node said no.
    Denied,
    /// No reply arrived before the deadline.
    TimedOut,
    /// The request could not be sent.
    Disconnected,
    /// The session ended while the attempt was pending.
    Cancelled,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptFailure::Busy => "another attempt is pending",
            AttemptFailure::Unavailable => "target unavailable",
            AttemptFailure::NoActor => "no local actor",
            AttemptFailure::Denied => "denied",
            AttemptFailure::TimedOut => "timed out",
            AttemptFailure::Disconnected => "disconnected",
            AttemptFailure::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(AttemptFailure),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Succeeded)
    }
}

pub type AttemptCallback = Box<dyn FnOnce(AttemptOutcome) + Send>;

struct Pending {
    kind: AttemptKind,
    request_id: RequestId,
    deadline: Instant,
    callback: AttemptCallback,
}

/// Attempt state for one local actor.
pub struct AttemptCoordinator {
    timeout: Duration,
    pending: Option<Pending>,
}

impl AttemptCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    pub fn pending_kind(&self) -> Option<AttemptKind> {
        self.pending.as_ref().map(|p| p.kind)
    }

    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending.as_ref().map(|p| p.request_id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Begins an attempt whose deadline is `now + timeout`.
    ///
    /// While another attempt is pending the new one fails at once with
    /// `Busy` and the pending one is left alone.
    pub fn start(
        &mut self,
        kind: AttemptKind,
        request_id: RequestId,
        now: Instant,
        callback: AttemptCallback,
    ) -> Result<(), AttemptFailure> {
        if self.pending.is_some() {
            debug!("[ATTEMPT] Rejecting {:?}: attempt already pending", kind);
            callback(AttemptOutcome::Failed(AttemptFailure::Busy));
            return Err(AttemptFailure::Busy);
        }
        debug!("[ATTEMPT] {:?} started as {}", kind, request_id);
        self.pending = Some(Pending {
            kind,
            request_id,
            deadline: now + self.timeout,
            callback,
        });
        Ok(())
    }

    /// Applies a reply. Returns false when it does not belong to the pending attempt.
    pub fn resolve(&mut self, target: ObjectId, request_id: RequestId, success: bool) -> bool {
        match &self.pending {
            Some(p) if p.request_id == request_id && p.kind.target() == target => {}
            _ => {
                debug!("[ATTEMPT] Ignoring stale reply {} for {}", request_id, target);
                return false;
            }
        }
        let outcome = if success {
            AttemptOutcome::Succeeded
        } else {
            AttemptOutcome::Failed(AttemptFailure::Denied)
        };
        self.finish(outcome);
        true
    }

    /// Fails the pending attempt if its deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some(p) if p.deadline <= now => {
                info!("[ATTEMPT] {:?} timed out", p.kind);
                self.finish(AttemptOutcome::Failed(AttemptFailure::TimedOut));
                true
            }
            _ => false,
        }
    }

    /// Fails the pending attempt with `failure`, if `request_id` is still pending.
    pub fn fail(&mut self, request_id: RequestId, failure: AttemptFailure) -> bool {
        if self.pending_request() != Some(request_id) {
            return false;
        }
        self.finish(AttemptOutcome::Failed(failure));
        true
    }

    /// Cancels whatever is pending.
    pub fn cancel(&mut self) {
        if self.pending.is_some() {
            self.finish(AttemptOutcome::Failed(AttemptFailure::Cancelled));
        }
    }

    fn finish(&mut self, outcome: AttemptOutcome) {
        if let Some(p) = self.pending.take() {
            debug!("[ATTEMPT] {:?} resolved: {:?}", p.kind, outcome);
            (p.callback)(outcome);
        }
    }
}

impl Drop for AttemptCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for AttemptCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptCoordinator")
            .field("timeout", &self.timeout)
            .field("pending", &self.pending_kind())
            .finish()
    }
}
