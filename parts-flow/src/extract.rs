use serde::{Deserialize, Serialize};

use crate::entities::{Entities, extract_entities};
use crate::intent::{Intent, MatchSource, classify};

/// Result of running the extractor over one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub intent: Intent,
    pub confidence: f32,
    pub source: MatchSource,
    pub entities: Entities,
}

/// Classify a message and pull out its entities.
///
/// Never fails: a message with nothing recognisable yields empty entities and
/// [`Intent::OutOfScope`].
pub fn extract(message: &str) -> Extraction {
    let entities = extract_entities(message);
    let matched = classify(message, &entities);

    tracing::debug!(
        intent = %matched.intent,
        confidence = matched.confidence,
        source = ?matched.source,
        entities = ?entities,
        "Extracted message intent"
    );

    Extraction {
        intent: matched.intent,
        confidence: matched.confidence,
        source: matched.source,
        entities,
    }
}
