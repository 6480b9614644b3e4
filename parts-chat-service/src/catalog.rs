use async_trait::async_trait;
use parts_flow::ApplianceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, ServiceError};

const SEED_CATALOG: &str = include_str!("../data/seed_parts.json");

/// Component names used to turn a vague "find a part" message into a search
pub const SEARCH_TERMS: &[&str] = &[
    "ice maker",
    "water filter",
    "door shelf",
    "door gasket",
    "inlet valve",
    "fan motor",
    "thermostat",
    "crisper drawer",
    "spray arm",
    "dishrack wheel",
    "drain pump",
    "heating element",
    "detergent dispenser",
    "door latch",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub partselect_number: String,
    #[serde(default)]
    pub manufacturer_number: Option<String>,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub appliance_type: ApplianceType,
    #[serde(default)]
    pub price_cents: Option<u32>,
    #[serde(default = "unknown_stock")]
    pub stock_status: StockStatus,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub compatible_models: Vec<String>,
    #[serde(default)]
    pub install_summary: Option<String>,
    #[serde(default)]
    pub product_url: Option<String>,
}

fn unknown_stock() -> StockStatus {
    StockStatus::Unknown
}

impl Part {
    pub fn price(&self) -> Option<f64> {
        self.price_cents.map(|cents| f64::from(cents) / 100.0)
    }

    pub fn in_stock(&self) -> Option<bool> {
        match self.stock_status {
            StockStatus::InStock => Some(true),
            StockStatus::OutOfStock => Some(false),
            StockStatus::Unknown => None,
        }
    }

    pub fn fits(&self, model_number: &str) -> bool {
        let model = normalize_model(model_number);
        self.compatible_models
            .iter()
            .any(|m| normalize_model(m) == model)
    }
}

fn normalize_model(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    parts: Vec<Part>,
}

/// Read access to the parts catalog
#[async_trait]
pub trait PartCatalog: Send + Sync {
    async fn get_part(&self, partselect_number: &str) -> Result<Option<Part>>;

    /// Parts known to fix `symptom`, restricted to one appliance type
    async fn search_parts_by_symptom(
        &self,
        symptom: &str,
        appliance: ApplianceType,
    ) -> Result<Vec<Part>>;

    /// Parts whose name contains any of `terms`
    async fn search_by_name(
        &self,
        terms: &[&str],
        appliance: Option<ApplianceType>,
        limit: usize,
    ) -> Result<Vec<Part>>;
}

/// In-memory catalog keyed by PartSelect number
pub struct InMemoryCatalog {
    parts: HashMap<String, Part>,
    // insertion order, for stable search results
    order: Vec<String>,
}

impl InMemoryCatalog {
    pub fn from_parts(parts: impl IntoIterator<Item = Part>) -> Self {
        let mut catalog = Self {
            parts: HashMap::new(),
            order: Vec::new(),
        };
        for mut part in parts {
            part.partselect_number = part.partselect_number.to_uppercase();
            let key = part.partselect_number.clone();
            if catalog.parts.insert(key.clone(), part).is_none() {
                catalog.order.push(key);
            }
        }
        catalog
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(raw).map_err(|e| ServiceError::Catalog(e.to_string()))?;
        Ok(Self::from_parts(file.parts))
    }

    /// The catalog bundled with the service
    pub fn seed() -> Result<Self> {
        let catalog = Self::from_json(SEED_CATALOG)?;
        info!(parts = catalog.len(), "Loaded seed catalog");
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Catalog(format!("{}: {e}", path.display())))?;
        let catalog = Self::from_json(&raw)?;
        info!(path = %path.display(), parts = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &Part> {
        self.order.iter().filter_map(|key| self.parts.get(key))
    }
}

#[async_trait]
impl PartCatalog for InMemoryCatalog {
    async fn get_part(&self, partselect_number: &str) -> Result<Option<Part>> {
        Ok(self.parts.get(&partselect_number.to_uppercase()).cloned())
    }

    async fn search_parts_by_symptom(
        &self,
        symptom: &str,
        appliance: ApplianceType,
    ) -> Result<Vec<Part>> {
        let parts: Vec<Part> = self
            .iter()
            .filter(|part| part.appliance_type == appliance)
            .filter(|part| part.symptoms.iter().any(|s| s.eq_ignore_ascii_case(symptom)))
            .cloned()
            .collect();
        debug!(symptom = %symptom, appliance = %appliance, matches = parts.len(), "Symptom search");
        Ok(parts)
    }

    async fn search_by_name(
        &self,
        terms: &[&str],
        appliance: Option<ApplianceType>,
        limit: usize,
    ) -> Result<Vec<Part>> {
        Ok(self
            .iter()
            .filter(|part| appliance.is_none_or(|a| part.appliance_type == a))
            .filter(|part| {
                let name = part.name.to_lowercase();
                terms.iter().any(|term| name.contains(&term.to_lowercase()))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
