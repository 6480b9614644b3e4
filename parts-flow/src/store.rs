use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::definition::{FlowDefinition, FlowDocument};
use crate::entities::ApplianceType;
use crate::error::{FlowError, Result};
use crate::flow::Flow;

/// Symptom key of the per-appliance catch-all flow
pub const GENERIC_SYMPTOM_KEY: &str = "generic";

const BUILTIN_FLOWS: &[(&str, &str)] = &[
    (
        "refrigerator_ice_maker.yaml",
        include_str!("../flows/refrigerator_ice_maker.yaml"),
    ),
    (
        "refrigerator_not_cooling.yaml",
        include_str!("../flows/refrigerator_not_cooling.yaml"),
    ),
    (
        "refrigerator_leaking.yaml",
        include_str!("../flows/refrigerator_leaking.yaml"),
    ),
    (
        "refrigerator_generic.yaml",
        include_str!("../flows/refrigerator_generic.yaml"),
    ),
    (
        "dishwasher_not_draining.yaml",
        include_str!("../flows/dishwasher_not_draining.yaml"),
    ),
    (
        "dishwasher_not_cleaning.yaml",
        include_str!("../flows/dishwasher_not_cleaning.yaml"),
    ),
    (
        "dishwasher_generic.yaml",
        include_str!("../flows/dishwasher_generic.yaml"),
    ),
];

/// Read-only source of validated flows
pub trait FlowStore: Send + Sync {
    fn get(&self, flow_id: &str) -> Option<Arc<Flow>>;
    fn find(&self, appliance: ApplianceType, symptom_key: &str) -> Option<Arc<Flow>>;
    /// Every flow, ordered by id
    fn flows(&self) -> Vec<Arc<Flow>>;
}

/// In-memory implementation of FlowStore
#[derive(Default)]
pub struct InMemoryFlowStore {
    flows: HashMap<String, Arc<Flow>>,
    by_symptom: HashMap<(ApplianceType, String), String>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register every definition; duplicates are rejected
    pub fn from_definitions(definitions: impl IntoIterator<Item = FlowDefinition>) -> Result<Self> {
        let mut store = Self::new();
        for definition in definitions {
            store.insert(definition.validate()?)?;
        }
        Ok(store)
    }

    /// The flows shipped with the crate
    pub fn builtin() -> Result<Self> {
        let mut definitions = Vec::new();
        for (name, raw) in BUILTIN_FLOWS {
            debug!(file = %name, "Parsing built-in flow");
            definitions.extend(FlowDocument::from_yaml(raw)?);
        }
        let store = Self::from_definitions(definitions)?;
        info!(flows = store.len(), "Loaded built-in troubleshooting flows");
        Ok(store)
    }

    /// Load every `*.json`, `*.yaml` and `*.yml` file in `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self::from_definitions(load_definitions(dir.as_ref())?)?;
        info!(
            dir = %dir.as_ref().display(),
            flows = store.len(),
            "Loaded troubleshooting flows from directory"
        );
        Ok(store)
    }

    pub fn insert(&mut self, flow: Flow) -> Result<()> {
        if self.flows.contains_key(flow.id()) {
            return Err(FlowError::invalid_definition(flow.id(), "duplicate flow_id"));
        }
        let key = (flow.appliance(), flow.symptom_key().to_string());
        if let Some(existing) = self.by_symptom.get(&key) {
            return Err(FlowError::invalid_definition(
                flow.id(),
                format!(
                    "{} / {} is already handled by flow {existing}",
                    key.0, key.1
                ),
            ));
        }
        self.by_symptom.insert(key, flow.id().to_string());
        self.flows.insert(flow.id().to_string(), Arc::new(flow));
        Ok(())
    }

    /// Insert, replacing any flow with the same id or the same appliance/symptom pair
    pub fn upsert(&mut self, flow: Flow) {
        let key = (flow.appliance(), flow.symptom_key().to_string());
        if let Some(previous) = self.flows.remove(flow.id()) {
            self.by_symptom
                .remove(&(previous.appliance(), previous.symptom_key().to_string()));
        }
        if let Some(shadowed) = self.by_symptom.remove(&key) {
            self.flows.remove(&shadowed);
        }
        debug!(flow_id = %flow.id(), "Registered flow");
        self.by_symptom.insert(key, flow.id().to_string());
        self.flows.insert(flow.id().to_string(), Arc::new(flow));
    }

    /// Merge the definitions found in `dir` over this store
    pub fn overlay_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let definitions = load_definitions(dir.as_ref())?;
        let count = definitions.len();
        for definition in definitions {
            self.upsert(definition.validate()?);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

impl FlowStore for InMemoryFlowStore {
    fn get(&self, flow_id: &str) -> Option<Arc<Flow>> {
        self.flows.get(flow_id).cloned()
    }

    fn find(&self, appliance: ApplianceType, symptom_key: &str) -> Option<Arc<Flow>> {
        self.by_symptom
            .get(&(appliance, symptom_key.to_string()))
            .and_then(|id| self.flows.get(id))
            .cloned()
    }

    fn flows(&self) -> Vec<Arc<Flow>> {
        let mut flows: Vec<_> = self.flows.values().cloned().collect();
        flows.sort_by(|a, b| a.id().cmp(b.id()));
        flows
    }
}

fn load_definitions(dir: &Path) -> Result<Vec<FlowDefinition>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    // deterministic load order
    paths.sort();

    let mut definitions = Vec::new();
    for path in paths {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parsed = match extension.as_deref() {
            Some("json") => FlowDocument::from_json(&std::fs::read_to_string(&path)?)?,
            Some("yaml") | Some("yml") => FlowDocument::from_yaml(&std::fs::read_to_string(&path)?)?,
            _ => continue,
        };
        debug!(file = %path.display(), flows = parsed.len(), "Parsed flow definitions");
        definitions.extend(parsed);
    }
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_flows_are_valid() {
        let store = InMemoryFlowStore::builtin().unwrap();
        assert_eq!(store.len(), BUILTIN_FLOWS.len());

        for appliance in ApplianceType::ALL {
            let generic = store.find(appliance, GENERIC_SYMPTOM_KEY).unwrap();
            assert_eq!(generic.appliance(), appliance);
        }

        let ice = store
            .find(ApplianceType::Refrigerator, "not_making_ice")
            .unwrap();
        assert_eq!(ice.id(), "refrigerator_ice_maker");
        assert_eq!(ice.longest_path(), 3);
        assert!(store.find(ApplianceType::Dishwasher, "not_making_ice").is_none());

        let ids: Vec<_> = store.flows().iter().map(|f| f.id().to_string()).collect();
        assert_eq!(ids.first().map(String::as_str), Some("dishwasher_generic"));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_duplicate_flows_are_rejected() {
        let raw = include_str!("../flows/dishwasher_generic.yaml");
        let mut definitions = FlowDocument::from_yaml(raw).unwrap();
        definitions.extend(FlowDocument::from_yaml(raw).unwrap());

        let err = InMemoryFlowStore::from_definitions(definitions).err().unwrap();
        assert!(matches!(err, FlowError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_upsert_replaces_by_symptom_key() {
        let mut store = InMemoryFlowStore::builtin().unwrap();
        let raw = include_str!("../flows/dishwasher_generic.yaml")
            .replace("flow_id: dishwasher_generic", "flow_id: dishwasher_generic_v2");
        let flow = FlowDocument::from_yaml(&raw)
            .unwrap()
            .remove(0)
            .validate()
            .unwrap();

        let before = store.len();
        store.upsert(flow);
        assert_eq!(store.len(), before);
        assert!(store.get("dishwasher_generic").is_none());
        assert_eq!(
            store
                .find(ApplianceType::Dishwasher, GENERIC_SYMPTOM_KEY)
                .unwrap()
                .id(),
            "dishwasher_generic_v2"
        );
    }
}
