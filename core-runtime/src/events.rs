//! # Event Bus System
//!
//! Broadcasts the progress of a maintenance run using `tokio::sync::broadcast`,
//! so library consumers and tests can follow a run without the orchestrator
//! knowing about them.
//!
//! ## Overview
//!
//! - [`CoreEvent`]: envelope around the [`MaintenanceEvent`] family
//! - [`EventBus`]: the sending side, cheap to clone
//! - [`EventStream`]: a receiver with an optional predicate
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, MaintenanceEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus
//!     .emit(CoreEvent::Maintenance(MaintenanceEvent::StepStarted {
//!         run_id: "run-1".to_string(),
//!         step: "refresh".to_string(),
//!     }))
//!     .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Maintenance step started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - `RecvError::Lagged(n)`: the subscriber fell `n` events behind and lost
//!   them; receiving continues with the oldest event still buffered.
//! - `RecvError::Closed`: every bus handle is gone.
//!
//! Emitting with no subscribers returns an error; publishers ignore it with
//! `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Events buffered per subscriber when no capacity is given.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published and received through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Maintenance run events
    Maintenance(MaintenanceEvent),
}

impl CoreEvent {
    /// Short label for log lines and notifications.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Maintenance(e) => e.description(),
        }
    }

    /// How loudly an observer should report this event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Maintenance(MaintenanceEvent::Aborted { .. }) => EventSeverity::Error,
            CoreEvent::Maintenance(MaintenanceEvent::GatedOut { .. }) => EventSeverity::Warning,
            CoreEvent::Maintenance(MaintenanceEvent::StepFinished { outcome, .. })
                if outcome == "warning" =>
            {
                EventSeverity::Warning
            }
            CoreEvent::Maintenance(MaintenanceEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Ordering used by [`EventStream::filter`] predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Maintenance Events
// ============================================================================

/// Events emitted while a maintenance run moves through its states.
///
/// Steps and states are carried as their lowercase names (`"refresh"`,
/// `"gate"`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MaintenanceEvent {
    /// A run has been started.
    RunStarted {
        run_id: String,
        /// `"maintenance"` or `"sync"`
        plan: String,
        /// Volume names in processing order.
        volumes: Vec<String>,
    },
    /// A step is about to execute.
    StepStarted { run_id: String, step: String },
    /// A step has finished.
    StepFinished {
        run_id: String,
        step: String,
        /// `"succeeded"`, `"skipped"`, `"warning"` or `"failed"`
        outcome: String,
        detail: Option<String>,
    },
    /// The change gate withheld synchronization.
    GatedOut {
        run_id: String,
        reasons: Vec<String>,
    },
    /// The run stopped before reaching its final state.
    Aborted {
        run_id: String,
        state: String,
        reason: String,
    },
    /// The run reached its final state.
    Completed {
        run_id: String,
        warnings: u32,
        duration_secs: u64,
    },
}

impl MaintenanceEvent {
    fn description(&self) -> &str {
        match self {
            MaintenanceEvent::RunStarted { .. } => "Maintenance run started",
            MaintenanceEvent::StepStarted { .. } => "Maintenance step started",
            MaintenanceEvent::StepFinished { .. } => "Maintenance step finished",
            MaintenanceEvent::GatedOut { .. } => "Sync withheld by change thresholds",
            MaintenanceEvent::Aborted { .. } => "Maintenance run aborted",
            MaintenanceEvent::Completed { .. } => "Maintenance run completed",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            MaintenanceEvent::RunStarted { run_id, .. }
            | MaintenanceEvent::StepStarted { run_id, .. }
            | MaintenanceEvent::StepFinished { run_id, .. }
            | MaintenanceEvent::GatedOut { run_id, .. }
            | MaintenanceEvent::Aborted { run_id, .. }
            | MaintenanceEvent::Completed { run_id, .. } => run_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// A bus buffering up to `capacity` undelivered events per subscriber.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Sends `event` to every current subscriber and returns how many there
    /// were. Fails when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.tx.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Live receivers on this bus.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Subscriber side of the bus, optionally restricted to some events.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventSeverity, EventStream};
///
/// let bus = EventBus::new(16);
/// let problems = EventStream::new(bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    rx: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(rx: Receiver<CoreEvent>) -> Self {
        Self { rx, filter: None }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Next buffered event passing the filter, or `None` when the buffer holds
    /// no such event right now.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drains every matching event currently buffered.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn step_started(step: &str) -> CoreEvent {
        CoreEvent::Maintenance(MaintenanceEvent::StepStarted {
            run_id: "run-1".to_string(),
            step: step.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(step_started("touch")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = step_started("refresh");
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Warning);

        bus.emit(step_started("diff")).ok();
        let gated = CoreEvent::Maintenance(MaintenanceEvent::GatedOut {
            run_id: "run-1".to_string(),
            reasons: vec!["removed: 60 > 50".to_string()],
        });
        bus.emit(gated.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), gated);
    }

    #[tokio::test]
    async fn test_drain_collects_buffered_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());

        bus.emit(step_started("touch")).ok();
        bus.emit(step_started("refresh")).ok();

        let events = stream.drain();
        assert_eq!(events, vec![step_started("touch"), step_started("refresh")]);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for step in ["touch", "refresh", "diff", "gate", "sync"] {
            bus.emit(step_started(step)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let aborted = CoreEvent::Maintenance(MaintenanceEvent::Aborted {
            run_id: "run-1".to_string(),
            state: "sync".to_string(),
            reason: "exit 1".to_string(),
        });
        assert_eq!(aborted.severity(), EventSeverity::Error);

        let warning = CoreEvent::Maintenance(MaintenanceEvent::StepFinished {
            run_id: "run-1".to_string(),
            step: "scrub".to_string(),
            outcome: "warning".to_string(),
            detail: Some("scrub failed".to_string()),
        });
        assert_eq!(warning.severity(), EventSeverity::Warning);

        let completed = CoreEvent::Maintenance(MaintenanceEvent::Completed {
            run_id: "run-1".to_string(),
            warnings: 0,
            duration_secs: 12,
        });
        assert_eq!(completed.severity(), EventSeverity::Info);

        assert_eq!(step_started("gate").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Maintenance(MaintenanceEvent::GatedOut {
            run_id: "run-7".to_string(),
            reasons: vec!["updated: 150 > 100".to_string()],
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Maintenance");
        assert_eq!(json["payload"]["event"], "GatedOut");
        assert_eq!(json["payload"]["run_id"], "run-7");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
