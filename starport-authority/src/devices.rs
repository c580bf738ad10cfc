//! Devices driven by a gateway's successful interactions.
//!
//! A `Dispenser` spawns one instance of its template per successful use.
//! A `Disposer` collects the unowned instances inside its volume, locks them
//! and its own gateway, and despawns them once the disposal period ends.

use starport_types::{ObjectId, TemplateId, Transform, Volume};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct Dispenser {
    pub template: TemplateId,
    pub spawn_point: Transform,
}

impl Dispenser {
    pub fn new(template: TemplateId, spawn_point: Transform) -> Self {
        Self { template, spawn_point }
    }
}

/// A disposal that is currently running.
#[derive(Debug, Clone, PartialEq)]
pub struct Disposal {
    pub items: Vec<ObjectId>,
    pub due: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyDisposing;

#[derive(Debug, Clone)]
pub struct Disposer {
    pub volume: Volume,
    /// `None` uses the node's configured disposal duration.
    duration: Option<Duration>,
    running: Option<Disposal>,
}

impl Disposer {
    pub fn new(volume: Volume) -> Self {
        Self {
            volume,
            duration: None,
            running: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn is_disposing(&self) -> bool {
        self.running.is_some()
    }

    pub fn due(&self) -> Option<Instant> {
        self.running.as_ref().map(|d| d.due)
    }

    /// Starts a disposal of `items` unless one is already running.
    ///
    /// `default_duration` applies when the disposer has no duration of its own.
    pub fn begin(
        &mut self,
        items: Vec<ObjectId>,
        now: Instant,
        default_duration: Duration,
    ) -> Result<&Disposal, AlreadyDisposing> {
        if self.running.is_some() {
            return Err(AlreadyDisposing);
        }
        Ok(self.running.insert(Disposal {
            items,
            due: now + self.duration.unwrap_or(default_duration),
        }))
    }

    /// Ends the running disposal if it is due at `now`.
    pub fn finish_if_due(&mut self, now: Instant) -> Option<Vec<ObjectId>> {
        match &self.running {
            Some(d) if d.due <= now => self.running.take().map(|d| d.items),
            _ => None,
        }
    }

    /// Drops an object from the running disposal (it was despawned elsewhere).
    pub fn forget(&mut self, object: &ObjectId) {
        if let Some(d) = self.running.as_mut() {
            d.items.retain(|item| item != object);
        }
    }

    /// Cancels the running disposal and returns the items it still held.
    pub fn abandon(&mut self) -> Vec<ObjectId> {
        self.running.take().map(|d| d.items).unwrap_or_default()
    }
}

/// What a gateway's successful interactions drive, if anything.
#[derive(Debug, Clone)]
pub enum DeviceBinding {
    Dispenser(Dispenser),
    Disposer(Disposer),
}
