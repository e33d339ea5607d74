use std::collections::HashSet;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::facilitator::{Facilitator, FacilitatorClient, FacilitatorDescriptor};

/// Facilitators in dispatch order: ascending priority, configuration order on ties.
///
/// Membership is fixed at construction. Only each facilitator's `enabled`
/// flag changes afterwards.
#[derive(Debug)]
pub struct FacilitatorRegistry {
    facilitators: Vec<Arc<Facilitator>>,
}

impl FacilitatorRegistry {
    /// Build the registry from descriptors paired with their clients.
    ///
    /// Duplicate ids keep the first occurrence. An empty list, an empty id
    /// or a zero timeout is a configuration error.
    pub fn new(
        entries: Vec<(FacilitatorDescriptor, Arc<dyn FacilitatorClient>)>,
    ) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        let mut facilitators = Vec::with_capacity(entries.len());

        for (descriptor, client) in entries {
            if descriptor.id.trim().is_empty() {
                return Err(RegistryError::EmptyId(descriptor.name));
            }
            if descriptor.timeout.is_some_and(|t| t.is_zero()) {
                return Err(RegistryError::ZeroTimeout(descriptor.id));
            }
            if !matches!(descriptor.endpoint.scheme(), "http" | "https") {
                return Err(RegistryError::InvalidEndpoint {
                    reason: format!("unsupported scheme '{}'", descriptor.endpoint.scheme()),
                    id: descriptor.id,
                });
            }
            if !seen.insert(descriptor.id.clone()) {
                tracing::warn!(facilitator = %descriptor.id, "Duplicate facilitator id ignored");
                continue;
            }
            facilitators.push(Arc::new(Facilitator::new(descriptor, client)));
        }

        if facilitators.is_empty() {
            return Err(RegistryError::Empty);
        }

        // Vec::sort_by_key is stable, so equal priorities keep configuration order.
        facilitators.sort_by_key(|f| f.priority());

        Ok(Self { facilitators })
    }

    /// Every facilitator, enabled or not, in dispatch order.
    pub fn all(&self) -> &[Arc<Facilitator>] {
        &self.facilitators
    }

    /// Enabled facilitators in dispatch order, as of this call.
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<Facilitator>> {
        self.facilitators.iter().filter(|f| f.is_enabled())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Facilitator>> {
        self.facilitators.iter().find(|f| f.id() == id)
    }

    /// Toggle a facilitator at runtime. Returns `false` for unknown ids.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.get(id) {
            Some(facilitator) => {
                facilitator.set_enabled(enabled);
                tracing::info!(facilitator = %id, enabled, "Facilitator toggled");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.facilitators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilitators.is_empty()
    }
}
