//! Tag-keyed dispatch of inbound events.
//!
//! Handlers are plain function pointers over a target type `T`, so a
//! registry is built once at session start and can be shared between
//! connections without cloning any state.

use futures::future::BoxFuture;
use openai_realtime_types::InboundEvent;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A handler receives the protocol state and the raw event. Payload
/// decoding is the handler's business.
pub type Handler<T> =
    for<'a> fn(&'a mut T, &'a InboundEvent) -> BoxFuture<'a, anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unhandled,
}

pub struct EventRegistry<T> {
    handlers: HashMap<String, Handler<T>>,
}

impl<T> Default for EventRegistry<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<T> EventRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any earlier registration.
    pub fn register(&mut self, kind: impl Into<String>, handler: Handler<T>) {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            debug!(kind = %kind, "Replaced event handler.");
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler for the event's tag. Unknown tags are logged and
    /// reported as [`Dispatch::Unhandled`]; handler errors are returned.
    pub async fn dispatch(&self, target: &mut T, event: &InboundEvent) -> anyhow::Result<Dispatch> {
        match self.handlers.get(event.kind()) {
            Some(handler) => {
                handler(target, event).await?;
                Ok(Dispatch::Handled)
            }
            None => {
                warn!(kind = %event.kind(), "Unhandled event type");
                Ok(Dispatch::Unhandled)
            }
        }
    }
}
