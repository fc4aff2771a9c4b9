//! Entrega fire-and-forget al runner de procesamiento.
//!
//! El core no observa la finalización del trabajo, ni reintentos, ni
//! garantías de entrega: sólo ofrece `submit`.
use std::sync::{Arc, Mutex};

use patch_domain::EventId;

pub trait ProcessingQueue: Send + Sync {
    fn submit(&self, event_id: EventId);
}

impl<T: ProcessingQueue + ?Sized> ProcessingQueue for Arc<T> {
    fn submit(&self, event_id: EventId) {
        (**self).submit(event_id)
    }
}

/// Cola que sólo registra los envíos (tests y ejecuciones sin runner).
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    submitted: Arc<Mutex<Vec<EventId>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<EventId> {
        self.submitted.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl ProcessingQueue for InMemoryQueue {
    fn submit(&self, event_id: EventId) {
        if let Ok(mut v) = self.submitted.lock() {
            v.push(event_id);
        }
    }
}
