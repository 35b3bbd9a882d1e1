// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Mapping Events
//
// In-memory fan-out of MappingEvents using a tokio broadcast channel.
// Observers (the CLI, tests, host integrations) subscribe to follow maps and
// unmaps as they complete. Events are not persisted.

use crate::domain::events::MappingEvent;
use crate::domain::ids::PortId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to mapping events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<MappingEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1024)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    /// Publish a mapping event to all subscribers
    pub fn publish(&self, event: MappingEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all mapping events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events concerning a single port (physical id)
    pub fn subscribe_port(&self, port_id: PortId) -> PortEventReceiver {
        PortEventReceiver {
            receiver: self.sender.subscribe(),
            port_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

fn map_try_recv_error(e: broadcast::error::TryRecvError) -> EventBusError {
    match e {
        broadcast::error::TryRecvError::Empty => EventBusError::Empty,
        broadcast::error::TryRecvError::Closed => EventBusError::Closed,
        broadcast::error::TryRecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all mapping events
pub struct EventReceiver {
    receiver: broadcast::Receiver<MappingEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<MappingEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<MappingEvent, EventBusError> {
        self.receiver.try_recv().map_err(map_try_recv_error)
    }

    /// Collect every event currently buffered
    pub fn drain(&mut self) -> Vec<MappingEvent> {
        std::iter::from_fn(|| self.try_recv().ok()).collect()
    }
}

/// Receiver for port-specific events (filtered)
pub struct PortEventReceiver {
    receiver: broadcast::Receiver<MappingEvent>,
    port_id: PortId,
}

impl PortEventReceiver {
    /// Receive the next event for the subscribed port
    /// Domain-wide events and events for other ports are skipped
    pub async fn recv(&mut self) -> Result<MappingEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.port_id() == Some(self.port_id) {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
