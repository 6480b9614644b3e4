use parts_flow::{AnswerOption, Cause, Intent, StepView, TerminalOutcome};
use serde::{Deserialize, Serialize};

use crate::cart::CartItem;
use crate::catalog::Part;

pub const RESPONSE_VERSION: &str = "1.1";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TroubleshootAnswerRequest {
    pub session_id: String,
    pub flow_id: String,
    #[serde(alias = "step")]
    pub step_number: u32,
    pub answer: String,
}

/// Where the content of a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Catalog,
    Flow,
    Rules,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub version: &'static str,
    pub session_id: String,
    pub assistant_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub source: ResponseSource,
    pub cards: Vec<Card>,
    pub quick_replies: Vec<String>,
}

impl ChatResponse {
    pub fn text(session_id: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            version: RESPONSE_VERSION,
            session_id: session_id.into(),
            assistant_text: assistant_text.into(),
            intent: None,
            source: ResponseSource::Rules,
            cards: Vec::new(),
            quick_replies: Vec::new(),
        }
    }

    pub fn intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn card(mut self, card: Card) -> Self {
        self.cards.push(card);
        self
    }

    pub fn cards(mut self, cards: impl IntoIterator<Item = Card>) -> Self {
        self.cards.extend(cards);
        self
    }

    pub fn quick_replies<I, S>(mut self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quick_replies = replies.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Card {
    pub id: String,
    #[serde(flatten)]
    pub body: CardBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CardBody {
    Product(ProductCard),
    TroubleshootStep(TroubleshootStepCard),
    TroubleshootResult(TroubleshootResultCard),
    OutOfScope(OutOfScopeCard),
    Cart(CartCard),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCard {
    pub title: String,
    pub partselect_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer_part_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub currency: &'static str,
    pub in_stock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fits_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TroubleshootStepCard {
    pub flow_id: String,
    pub step_number: u32,
    pub total_steps: u32,
    pub question: String,
    pub options: Vec<AnswerOption>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TroubleshootResultCard {
    pub flow_id: String,
    pub total_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub causes: Vec<Cause>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutOfScopeCard {
    pub message: String,
    pub example_queries: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCard {
    pub items: Vec<CartLine>,
    pub item_count: u32,
    pub total_cents: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub name: Option<String>,
    pub price_cents: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TroubleshootStatus {
    pub session_id: String,
    pub step: TroubleshootStepCard,
}

#[derive(Debug, Serialize)]
pub struct ExitResponse {
    pub session_id: String,
    pub exited: bool,
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub session_id: String,
    pub ended: bool,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub session_id: String,
    pub cart: CartCard,
}

impl From<&StepView> for TroubleshootStepCard {
    fn from(step: &StepView) -> Self {
        Self {
            flow_id: step.flow_id.clone(),
            step_number: step.step_number,
            total_steps: step.total_steps,
            question: step.question.clone(),
            options: step.options.clone(),
        }
    }
}

impl Card {
    pub fn product(part: &Part, fits_model: Option<&str>) -> Self {
        Self {
            id: format!("product_{}", part.partselect_number),
            body: CardBody::Product(ProductCard {
                title: part.name.clone(),
                partselect_number: part.partselect_number.clone(),
                manufacturer_part_number: part.manufacturer_number.clone(),
                brand: part.brand.clone(),
                price: part.price(),
                currency: "USD",
                in_stock: part.in_stock(),
                product_url: part.product_url.clone(),
                fits_model: fits_model.map(str::to_string),
            }),
        }
    }

    pub fn troubleshoot_step(step: &StepView) -> Self {
        Self {
            id: format!("trouble_{}_{}", step.flow_id, step.step_number),
            body: CardBody::TroubleshootStep(step.into()),
        }
    }

    pub fn troubleshoot_result(outcome: &TerminalOutcome) -> Self {
        Self {
            id: format!("trouble_{}_result", outcome.flow_id),
            body: CardBody::TroubleshootResult(TroubleshootResultCard {
                flow_id: outcome.flow_id.clone(),
                total_steps: outcome.total_steps,
                summary: outcome.summary.clone(),
                causes: outcome.causes.clone(),
            }),
        }
    }

    pub fn out_of_scope() -> Self {
        Self {
            id: "oos_1".to_string(),
            body: CardBody::OutOfScope(OutOfScopeCard {
                message: "I can help you find parts, check compatibility, and troubleshoot issues for fridges and dishwashers.".to_string(),
                example_queries: vec![
                    "The ice maker on my Whirlpool fridge is not working".to_string(),
                    "Is PS11752778 compatible with WDT780SAEM1?".to_string(),
                    "How can I install part PS11752778?".to_string(),
                ],
            }),
        }
    }

    pub fn cart(card: CartCard) -> Self {
        Self {
            id: "cart".to_string(),
            body: CardBody::Cart(card),
        }
    }
}
