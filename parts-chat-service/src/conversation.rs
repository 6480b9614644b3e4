use dashmap::DashMap;
use parts_flow::{ApplianceType, Entities, SessionKey};
use serde::Serialize;
use std::sync::Arc;

/// Facts remembered across turns of one conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub appliance: Option<ApplianceType>,
    pub model_number: Option<String>,
    pub part_number: Option<String>,
    pub brand: Option<String>,
}

impl ConversationContext {
    /// Fold the entities of a new message in; newer values win
    pub fn absorb(&mut self, entities: &Entities) {
        if entities.appliance_type.is_some() {
            self.appliance = entities.appliance_type;
        }
        if let Some(model) = &entities.model_number {
            self.model_number = Some(model.clone());
        }
        if let Some(part) = &entities.part_number {
            self.part_number = Some(part.clone());
        }
        if let Some(brand) = &entities.brand {
            self.brand = Some(brand.clone());
        }
    }
}

/// Context per conversation; entries live until [`ConversationStore::forget`]
#[derive(Clone, Default)]
pub struct ConversationStore {
    contexts: Arc<DashMap<SessionKey, ConversationContext>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SessionKey) -> ConversationContext {
        self.contexts
            .get(key)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Merge `entities` into the stored context and return the result
    pub fn update(&self, key: &SessionKey, entities: &Entities) -> ConversationContext {
        let mut context = self.contexts.entry(key.clone()).or_default();
        context.absorb(entities);
        context.clone()
    }

    pub fn forget(&self, key: &SessionKey) -> bool {
        self.contexts.remove(key).is_some()
    }

    pub fn remember_part(&self, key: &SessionKey, part_number: &str) {
        self.contexts.entry(key.clone()).or_default().part_number = Some(part_number.to_string());
    }
}
