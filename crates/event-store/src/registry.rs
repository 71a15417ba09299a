use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{BoxError, EventStoreError, Result, StoredEvent};

/// Turns a stored payload back into a typed event.
pub type Decoder<E> = fn(&Map<String, Value>) -> std::result::Result<E, BoxError>;

/// Maps stable event tags to decoders.
///
/// Built once at startup. Decoding a record whose tag is not registered is
/// an error, never a silent skip.
pub struct EventRegistry<E> {
    decoders: HashMap<String, Decoder<E>>,
}

impl<E> EventRegistry<E> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers a decoder for `event_type`, replacing any earlier one.
    pub fn register(mut self, event_type: impl Into<String>, decoder: Decoder<E>) -> Self {
        self.decoders.insert(event_type.into(), decoder);
        self
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    pub fn decode(&self, record: &StoredEvent) -> Result<E> {
        let decoder = self
            .decoders
            .get(&record.event_type)
            .ok_or_else(|| EventStoreError::UnknownEventType(record.event_type.clone()))?;

        decoder(&record.payload).map_err(|source| EventStoreError::Deserialization {
            event_type: record.event_type.clone(),
            source,
        })
    }
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}
