// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Entity mutation events, broadcast to subscribers (search cache
//! invalidation, ingestion feedback, external listeners).

use memento_types::{Entity, EntityId};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum EntityEvent {
    Created(Entity),
    Updated(Entity),
    Deleted(EntityId),
}

#[derive(Clone)]
pub struct EntityEventBus {
    sender: broadcast::Sender<EntityEvent>,
}

impl Default for EntityEventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }
}

impl EntityEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: EntityEvent) {
        // No subscribers is the common case in tests; not an error.
        let _ = self.sender.send(event);
    }
}
