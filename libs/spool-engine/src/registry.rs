use std::collections::HashMap;

use spool_api::metadata::TopicMetadata;

use crate::error::EngineError;

/// Outcome of a successful `TopicRegistry::register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// New topic. The backend must be told about it.
    Inserted,
    /// Identical definition was already present. Nothing to do.
    AlreadyPresent,
}

/// Topics of one open container.
///
/// Owned exclusively by a writer, so no interior locking. Reset only when the
/// writer moves to a new container; there is no removal.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashMap<String, TopicMetadata>,
    /// Creation order, for listing.
    order: Vec<String>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: TopicMetadata) -> Result<Registration, EngineError> {
        let registration = self.check(&metadata)?;
        if registration == Registration::Inserted {
            self.order.push(metadata.name.clone());
            self.topics.insert(metadata.name.clone(), metadata);
        }
        Ok(registration)
    }

    /// Validate `metadata` the way `register` would, without inserting it.
    pub fn check(&self, metadata: &TopicMetadata) -> Result<Registration, EngineError> {
        match self.topics.get(&metadata.name) {
            Some(existing) if existing.conflicts_with(metadata) => {
                Err(conflict_error(existing, metadata.clone()))
            }
            Some(_) => Ok(Registration::AlreadyPresent),
            None => Ok(Registration::Inserted),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&TopicMetadata> {
        self.topics.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    /// All topics in creation order.
    pub fn topics(&self) -> Vec<TopicMetadata> {
        self.order
            .iter()
            .filter_map(|name| self.topics.get(name).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
        self.order.clear();
    }
}

pub(crate) fn conflict_error(registered: &TopicMetadata, requested: TopicMetadata) -> EngineError {
    EngineError::MetadataConflict {
        topic: requested.name,
        registered_type: registered.message_type.clone(),
        registered_format: registered.serialization_format.clone(),
        requested_type: requested.message_type,
        requested_format: requested.serialization_format,
    }
}
