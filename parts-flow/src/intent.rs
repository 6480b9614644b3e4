//! Intent classification as an ordered decision list.
//!
//! Rules are evaluated top to bottom and the first one whose predicate matches
//! decides the intent. Precedence is therefore the position in [`INTENT_RULES`],
//! not a score.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::entities::{Entities, normalize};

/// Confidence reported when an intent keyword matched
pub const KEYWORD_CONFIDENCE: f32 = 0.9;
/// Confidence reported when only a part/model number implied `part_lookup`
pub const ENTITY_FALLBACK_CONFIDENCE: f32 = 0.6;
/// Confidence reported for `out_of_scope` when nothing matched
pub const NO_MATCH_CONFIDENCE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PartLookup,
    CompatibilityCheck,
    InstallHelp,
    Troubleshoot,
    CartAction,
    OrderSupport,
    ReturnsPolicy,
    OutOfScope,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PartLookup => "part_lookup",
            Intent::CompatibilityCheck => "compatibility_check",
            Intent::InstallHelp => "install_help",
            Intent::Troubleshoot => "troubleshoot",
            Intent::CartAction => "cart_action",
            Intent::OrderSupport => "order_support",
            Intent::ReturnsPolicy => "returns_policy",
            Intent::OutOfScope => "out_of_scope",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an intent was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Keyword,
    EntityFallback,
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentMatch {
    pub intent: Intent,
    pub confidence: f32,
    pub source: MatchSource,
}

/// One entry of the decision list
pub struct IntentRule {
    pub intent: Intent,
    patterns: Vec<Regex>,
    /// Extra entity-based trigger evaluated alongside the keyword patterns
    entity_trigger: Option<fn(&str, &Entities) -> bool>,
}

impl IntentRule {
    fn new(intent: Intent, patterns: &[&str]) -> Self {
        Self {
            intent,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("valid intent pattern"))
                .collect(),
            entity_trigger: None,
        }
    }

    fn with_entity_trigger(mut self, trigger: fn(&str, &Entities) -> bool) -> Self {
        self.entity_trigger = Some(trigger);
        self
    }

    /// `lower` must already be normalized
    pub fn matches(&self, lower: &str, entities: &Entities) -> bool {
        self.patterns.iter().any(|p| p.is_match(lower))
            || self
                .entity_trigger
                .is_some_and(|trigger| trigger(lower, entities))
    }
}

fn symptom_or_bare_appliance(lower: &str, entities: &Entities) -> bool {
    entities.symptom.is_some()
        || matches!(lower.trim(), "refrigerator" | "fridge" | "dishwasher")
}

pub static INTENT_RULES: LazyLock<Vec<IntentRule>> = LazyLock::new(|| {
    vec![
        IntentRule::new(
            Intent::CompatibilityCheck,
            &[
                r"\b(?:compatible|compatibility|incompatible)\b",
                r"\b(?:fit|fits|fitting)\b",
                r"\b(?:work|works) with\b",
            ],
        ),
        IntentRule::new(
            Intent::PartLookup,
            &[
                r"\bpart (?:number|#|no\.?)\b",
                r"\b(?:find|search|look ?up|lookup) (?:a |the |for )?parts?\b",
                r"\bpart lookup\b",
                r"\b(?:in stock|how much|price|cost)\b",
            ],
        ),
        IntentRule::new(
            Intent::InstallHelp,
            &[
                r"\b(?:install|installation|installing|replace|replacing|replacement)\b",
                r"\b(?:how do i|how can i|how to)\b",
            ],
        ),
        IntentRule::new(
            Intent::Troubleshoot,
            &[
                r"\b(?:troubleshoot|troubleshooting|diagnose|not working|broken|problem|issue|fix|repair)\b",
            ],
        )
        .with_entity_trigger(symptom_or_bare_appliance),
        IntentRule::new(
            Intent::CartAction,
            &[
                r"\b(?:cart|basket|checkout|check out|buy now|purchase)\b",
                r"\badd (?:it|this|that|one|ps\d{6,9})\b",
                r"\b(?:make that|change to|update to|change quantity|update quantity)\s*\d+\b",
            ],
        ),
        IntentRule::new(
            Intent::OrderSupport,
            &[
                r"\b(?:order status|my order|order number|where is my order)\b",
                r"\b(?:track|tracking|shipping|shipped|delivery|delivered)\b",
                r"\bcancel (?:my |the |an )?order\b",
            ],
        ),
        IntentRule::new(
            Intent::ReturnsPolicy,
            &[r"\b(?:return|returns|returning|refund|refunds|exchange|policy)\b"],
        ),
    ]
});

/// Classify a message given the entities already extracted from it
pub fn classify(message: &str, entities: &Entities) -> IntentMatch {
    let lower = normalize(message);

    if let Some(rule) = INTENT_RULES
        .iter()
        .find(|rule| rule.matches(&lower, entities))
    {
        return IntentMatch {
            intent: rule.intent,
            confidence: KEYWORD_CONFIDENCE,
            source: MatchSource::Keyword,
        };
    }

    // An actionable identifier outranks "no intent keyword found"
    if entities.has_identifier() {
        return IntentMatch {
            intent: Intent::PartLookup,
            confidence: ENTITY_FALLBACK_CONFIDENCE,
            source: MatchSource::EntityFallback,
        };
    }

    IntentMatch {
        intent: Intent::OutOfScope,
        confidence: NO_MATCH_CONFIDENCE,
        source: MatchSource::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::extract_entities;

    fn intent_of(message: &str) -> IntentMatch {
        classify(message, &extract_entities(message))
    }

    #[test]
    fn test_compatibility_outranks_identifiers() {
        let m = intent_of("Is PS11701542 compatible with WRS325SDHZ00?");
        assert_eq!(m.intent, Intent::CompatibilityCheck);
        assert_eq!(m.source, MatchSource::Keyword);
        assert_eq!(intent_of("will this fit my fridge").intent, Intent::CompatibilityCheck);
    }

    #[test]
    fn test_priority_order() {
        // part_lookup keywords beat install keywords
        assert_eq!(
            intent_of("how much does it cost to replace PS11701542").intent,
            Intent::PartLookup
        );
        assert_eq!(
            intent_of("How can I install part PS11752778?").intent,
            Intent::InstallHelp
        );
        assert_eq!(
            intent_of("my dishwasher is leaking").intent,
            Intent::Troubleshoot
        );
        assert_eq!(intent_of("add it to my cart").intent, Intent::CartAction);
        assert_eq!(intent_of("where is my order?").intent, Intent::OrderSupport);
        assert_eq!(intent_of("what is your refund policy").intent, Intent::ReturnsPolicy);
    }

    #[test]
    fn test_bare_appliance_name_is_troubleshoot() {
        assert_eq!(intent_of("Dishwasher").intent, Intent::Troubleshoot);
        assert_eq!(intent_of("fridge").intent, Intent::Troubleshoot);
    }

    #[test]
    fn test_entity_fallback_is_part_lookup_with_lower_confidence() {
        let m = intent_of("PS11701542");
        assert_eq!(m.intent, Intent::PartLookup);
        assert_eq!(m.source, MatchSource::EntityFallback);
        assert!(m.confidence < KEYWORD_CONFIDENCE);

        assert_eq!(intent_of("WDT780SAEM1").intent, Intent::PartLookup);
    }

    #[test]
    fn test_out_of_scope_when_nothing_matches() {
        let m = intent_of("Can you help with my washing machine?");
        assert_eq!(m.intent, Intent::OutOfScope);
        assert_eq!(m.source, MatchSource::NoMatch);
        assert_eq!(intent_of("hello there").intent, Intent::OutOfScope);
    }

    #[test]
    fn test_intent_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Intent::CompatibilityCheck).unwrap(),
            "compatibility_check"
        );
        assert_eq!(Intent::OutOfScope.to_string(), "out_of_scope");
    }
}
