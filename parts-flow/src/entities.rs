//! Rule-based entity extraction: part numbers, model numbers, appliance type,
//! brand and symptom phrases.
//!
//! All patterns are compiled once into statics and scanned in a fixed order, so
//! the same message always yields the same [`Entities`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Appliances the assistant supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplianceType {
    Refrigerator,
    Dishwasher,
}

impl ApplianceType {
    pub const ALL: [ApplianceType; 2] = [ApplianceType::Refrigerator, ApplianceType::Dishwasher];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplianceType::Refrigerator => "refrigerator",
            ApplianceType::Dishwasher => "dishwasher",
        }
    }
}

impl fmt::Display for ApplianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplianceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "refrigerator" | "fridge" => Ok(ApplianceType::Refrigerator),
            "dishwasher" => Ok(ApplianceType::Dishwasher),
            other => Err(format!("unsupported appliance type: {other}")),
        }
    }
}

/// Canonical symptom phrases.
///
/// The phrase is what gets handed to symptom search; the key joins a symptom to
/// a troubleshooting flow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symptom {
    NotMakingIce,
    NotCooling,
    NotDraining,
    NotCleaningDishes,
    NotDrying,
    Leaking,
    Noisy,
    WontStart,
    NotWorking,
}

impl Symptom {
    pub const ALL: [Symptom; 9] = [
        Symptom::NotMakingIce,
        Symptom::NotCooling,
        Symptom::NotDraining,
        Symptom::NotCleaningDishes,
        Symptom::NotDrying,
        Symptom::Leaking,
        Symptom::Noisy,
        Symptom::WontStart,
        Symptom::NotWorking,
    ];

    pub fn phrase(&self) -> &'static str {
        match self {
            Symptom::NotMakingIce => "not making ice",
            Symptom::NotCooling => "not cooling",
            Symptom::NotDraining => "not draining",
            Symptom::NotCleaningDishes => "not cleaning dishes",
            Symptom::NotDrying => "not drying",
            Symptom::Leaking => "leaking",
            Symptom::Noisy => "noisy",
            Symptom::WontStart => "won't start",
            Symptom::NotWorking => "not working",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Symptom::NotMakingIce => "not_making_ice",
            Symptom::NotCooling => "not_cooling",
            Symptom::NotDraining => "not_draining",
            Symptom::NotCleaningDishes => "not_cleaning_dishes",
            Symptom::NotDrying => "not_drying",
            Symptom::Leaking => "leaking",
            Symptom::Noisy => "noisy",
            Symptom::WontStart => "wont_start",
            Symptom::NotWorking => "not_working",
        }
    }

    pub fn from_phrase(phrase: &str) -> Option<Self> {
        let phrase = phrase.trim();
        Symptom::ALL
            .into_iter()
            .find(|s| s.phrase().eq_ignore_ascii_case(phrase) || s.key() == phrase)
    }
}

impl fmt::Display for Symptom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

impl Serialize for Symptom {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.phrase())
    }
}

impl<'de> Deserialize<'de> for Symptom {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Symptom::from_phrase(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown symptom: {raw}")))
    }
}

/// Entities pulled out of a single message. `None` means "not detected".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appliance_type: Option<ApplianceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptom: Option<Symptom>,
    /// An appliance the assistant does not cover (oven, washer, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsupported_appliance: Option<String>,
}

impl Entities {
    /// True when the message named something a catalog lookup can act on
    pub fn has_identifier(&self) -> bool {
        self.part_number.is_some() || self.model_number.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Entities::default()
    }
}

static PART_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPS(\d{6,9})\b").expect("valid part number pattern"));

static EXACT_PART_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PS\d{6,9}$").expect("valid part number pattern"));

// Matched against the upper-cased message
static PREFIXED_MODEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bMODEL(?:\s+NUMBER|\s*NO\.?|\s*#)?\s*[:#]?\s*([A-Z0-9]{5,15})\b")
        .expect("valid model prefix pattern")
});

static MODEL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{5,15}\b").expect("valid model token pattern"));

const MODEL_STOP_WORDS: &[&str] = &["YES", "NO", "HELP", "TRUE", "FALSE", "ERROR"];

static REFRIGERATOR_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:refrigerators?|fridges?|freezers?|ice ?makers?|water filters?|crispers?|door shel(?:f|ves)|ice)\b",
    )
    .expect("valid refrigerator vocabulary")
});

static DISHWASHER_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:dishwashers?|spray arms?|dish ?racks?|detergent dispensers?|drain pumps?|heating elements?|dishes)\b",
    )
    .expect("valid dishwasher vocabulary")
});

static UNSUPPORTED_APPLIANCES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(washing machine|clothes dryer|wine cooler|microwave|washer|dryer|oven|stove)s?\b",
    )
    .expect("valid unsupported appliance vocabulary")
});

const BRANDS: &[&str] = &[
    "whirlpool",
    "ge",
    "frigidaire",
    "samsung",
    "lg",
    "kenmore",
    "maytag",
    "kitchenaid",
    "bosch",
    "amana",
    "electrolux",
];

static BRAND_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    BRANDS
        .iter()
        .map(|brand| {
            let pattern = format!(r"\b{brand}\b");
            (Regex::new(&pattern).expect("valid brand pattern"), *brand)
        })
        .collect()
});

// Specific symptoms first; the generic "not working" only wins when nothing else does
static SYMPTOM_PATTERNS: LazyLock<Vec<(Regex, Symptom)>> = LazyLock::new(|| {
    vec![
        (
            r"\b(?:not making ice|no ice|ice ?maker (?:is )?(?:not working|broken|stopped)|ice ?maker won't)",
            Symptom::NotMakingIce,
        ),
        (
            r"\b(?:not cooling|not cold|too warm|warm)\b",
            Symptom::NotCooling,
        ),
        (
            r"\b(?:not draining|won't drain|doesn't drain|standing water|water in (?:the )?bottom)",
            Symptom::NotDraining,
        ),
        (
            r"\b(?:not cleaning|dishes (?:are )?(?:still )?dirty|not washing|won't clean)",
            Symptom::NotCleaningDishes,
        ),
        (
            r"\b(?:not drying|wet dishes|won't dry)",
            Symptom::NotDrying,
        ),
        (
            r"\b(?:leak|leaks|leaking|leaky|dripping|water on (?:the )?floor)\b",
            Symptom::Leaking,
        ),
        (
            r"\b(?:noisy|loud|grinding|squeaking|squealing|rattling)\b",
            Symptom::Noisy,
        ),
        (
            r"\b(?:won't start|not starting|doesn't start|won't turn on|not turning on)",
            Symptom::WontStart,
        ),
        (
            r"\b(?:not working|won't work|doesn't work|stopped working)",
            Symptom::NotWorking,
        ),
    ]
    .into_iter()
    .map(|(pattern, symptom)| (Regex::new(pattern).expect("valid symptom pattern"), symptom))
    .collect()
});

/// Lower-case a message and fold typographic apostrophes so the keyword
/// patterns only have to spell contractions one way.
pub(crate) fn normalize(message: &str) -> String {
    message
        .to_lowercase()
        .replace(['\u{2019}', '\u{2018}', '`'], "'")
}

/// Extract every entity the message carries
pub fn extract_entities(message: &str) -> Entities {
    let lower = normalize(message);
    Entities {
        part_number: extract_part_number(message),
        model_number: extract_model_number(message),
        appliance_type: extract_appliance(&lower),
        brand: extract_brand(&lower),
        symptom: extract_symptom(&lower),
        unsupported_appliance: UNSUPPORTED_APPLIANCES
            .captures(&lower)
            .map(|caps| caps[1].to_string()),
    }
}

pub fn extract_part_number(message: &str) -> Option<String> {
    PART_NUMBER
        .captures(message)
        .map(|caps| format!("PS{}", &caps[1]))
}

pub fn is_part_number(token: &str) -> bool {
    EXACT_PART_NUMBER.is_match(&token.to_uppercase())
}

fn is_model_candidate(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && !EXACT_PART_NUMBER.is_match(token)
        && !MODEL_STOP_WORDS.contains(&token)
}

pub fn extract_model_number(message: &str) -> Option<String> {
    let upper = message.to_uppercase();

    let prefixed = PREFIXED_MODEL
        .captures_iter(&upper)
        .map(|caps| caps[1].to_string())
        .find(|token| is_model_candidate(token));
    if prefixed.is_some() {
        return prefixed;
    }

    MODEL_TOKEN
        .find_iter(&upper)
        .map(|m| m.as_str())
        .find(|token| is_model_candidate(token))
        .map(str::to_string)
}

fn extract_appliance(lower: &str) -> Option<ApplianceType> {
    if REFRIGERATOR_TERMS.is_match(lower) {
        Some(ApplianceType::Refrigerator)
    } else if DISHWASHER_TERMS.is_match(lower) {
        Some(ApplianceType::Dishwasher)
    } else {
        None
    }
}

fn extract_brand(lower: &str) -> Option<String> {
    BRAND_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(lower))
        .map(|(_, brand)| display_brand(brand))
}

fn display_brand(brand: &str) -> String {
    match brand {
        "ge" | "lg" => brand.to_uppercase(),
        _ => {
            let mut chars = brand.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

static ICE_MAKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bice ?makers?\b").expect("valid ice maker pattern"));

static GENERIC_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:not working|won't work|doesn't work|isn't working|stopped working|stopped|broken|broke)\b",
    )
    .expect("valid failure pattern")
});

fn extract_symptom(lower: &str) -> Option<Symptom> {
    let symptom = SYMPTOM_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(lower))
        .map(|(_, symptom)| *symptom);

    // a failing ice maker means no ice, wherever the failure phrase sits
    match symptom {
        None | Some(Symptom::NotWorking)
            if ICE_MAKER.is_match(lower) && GENERIC_FAILURE.is_match(lower) =>
        {
            Some(Symptom::NotMakingIce)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_number_ignores_case_and_punctuation() {
        assert_eq!(
            extract_part_number("is PS11701542 in stock?").as_deref(),
            Some("PS11701542")
        );
        assert_eq!(
            extract_part_number("(ps11701542), please").as_deref(),
            Some("PS11701542")
        );
        assert_eq!(
            extract_part_number("first PS123456 then PS7654321").as_deref(),
            Some("PS123456")
        );
        assert_eq!(extract_part_number("PS12345 is too short"), None);
        assert_eq!(extract_part_number("PS1234567890 is too long"), None);
    }

    #[test]
    fn test_model_number_skips_part_numbers() {
        let entities = extract_entities("Is PS11701542 compatible with WRS325SDHZ00?");
        assert_eq!(entities.part_number.as_deref(), Some("PS11701542"));
        assert_eq!(entities.model_number.as_deref(), Some("WRS325SDHZ00"));
    }

    #[test]
    fn test_prefixed_model_takes_precedence() {
        assert_eq!(
            extract_model_number("my part ABC12345 for model: wdt780saem1").as_deref(),
            Some("WDT780SAEM1")
        );
        assert_eq!(
            extract_model_number("model number WRS325SDHZ00 and XYZ99999").as_deref(),
            Some("WRS325SDHZ00")
        );
    }

    #[test]
    fn test_model_number_requires_a_digit() {
        assert_eq!(extract_model_number("Whirlpool fridge please"), None);
        assert_eq!(extract_model_number("HELLO THERE"), None);
    }

    #[test]
    fn test_appliance_vocabulary_order() {
        assert_eq!(
            extract_entities("my fridge").appliance_type,
            Some(ApplianceType::Refrigerator)
        );
        assert_eq!(
            extract_entities("the spray arm is stuck").appliance_type,
            Some(ApplianceType::Dishwasher)
        );
        // refrigerator terms are scanned first
        assert_eq!(
            extract_entities("ice on the dishwasher rack").appliance_type,
            Some(ApplianceType::Refrigerator)
        );
        assert_eq!(extract_entities("my washing machine").appliance_type, None);
    }

    #[test]
    fn test_brand_display_form() {
        assert_eq!(extract_entities("GE fridge").brand.as_deref(), Some("GE"));
        assert_eq!(
            extract_entities("my whirlpool dishwasher").brand.as_deref(),
            Some("Whirlpool")
        );
        assert_eq!(extract_entities("a large fridge").brand, None);
    }

    #[test]
    fn test_symptoms_are_canonical() {
        let cases = [
            ("The ice maker is not working", Symptom::NotMakingIce),
            ("dishwasher won\u{2019}t drain", Symptom::NotDraining),
            ("dishes are still dirty", Symptom::NotCleaningDishes),
            ("water on the floor under the fridge", Symptom::Leaking),
            ("it won't start", Symptom::WontStart),
            ("my fridge stopped working", Symptom::NotWorking),
            (
                "The ice maker on my Whirlpool fridge is not working",
                Symptom::NotMakingIce,
            ),
            ("the icemaker in my freezer is broken", Symptom::NotMakingIce),
            ("my ice maker is leaking", Symptom::Leaking),
        ];
        for (message, expected) in cases {
            assert_eq!(extract_entities(message).symptom, Some(expected), "{message}");
        }
    }

    #[test]
    fn test_unsupported_appliance_is_recorded() {
        let entities = extract_entities("Can you help with my washing machine?");
        assert_eq!(entities.unsupported_appliance.as_deref(), Some("washing machine"));
        assert!(!entities.has_identifier());
        assert_eq!(entities.appliance_type, None);
    }

    #[test]
    fn test_symptom_serializes_as_phrase() {
        let entities = Entities {
            symptom: Some(Symptom::WontStart),
            ..Default::default()
        };
        let json = serde_json::to_value(&entities).unwrap();
        assert_eq!(json["symptom"], "won't start");
    }
}
