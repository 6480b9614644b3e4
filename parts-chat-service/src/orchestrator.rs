//! Routes each chat message to the handler for its intent.
//!
//! One [`ChatOrchestrator`] is shared by all requests. Per-conversation state
//! (remembered entities, the active troubleshooting flow and the cart) lives in
//! stores keyed by [`SessionKey`].

use parts_flow::{
    ApplianceType, Entities, Extraction, FlowError, FlowStore, GENERIC_SYMPTOM_KEY, Intent,
    Progress, SessionKey, StepView, TroubleshootRunner, extract,
};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::cart::{CartCommand, CartStore};
use crate::catalog::{Part, PartCatalog, SEARCH_TERMS};
use crate::conversation::{ConversationContext, ConversationStore};
use crate::error::{Result, ServiceError};
use crate::models::{Card, CartCard, CartLine, ChatResponse, ResponseSource};

const MAX_PRODUCT_CARDS: usize = 5;

const RETURNS_POLICY: &str = "PartSelect offers a 365-day return policy on most parts. Returns are accepted for:
- Unused parts in original packaging
- Parts that don't fit (with proof of purchase)
- Defective parts

To start a return:
1. Contact customer service within 365 days
2. Provide your order number and the reason
3. Receive a return authorization
4. Ship the part back with tracking

Refunds are processed within 5-7 business days after the return arrives.";

const ORDER_SUPPORT: &str = "I can't look up orders from this chat. For order status, shipping updates or cancellations, use the order status page on PartSelect with your order number and email address, or contact customer service.";

static EXIT_FLOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:exit|stop|cancel|quit|start over|never ?mind)\s*[.!]*\s*$")
        .expect("valid exit pattern")
});

pub struct ChatOrchestrator {
    catalog: Arc<dyn PartCatalog>,
    runner: TroubleshootRunner,
    carts: CartStore,
    conversations: ConversationStore,
}

impl ChatOrchestrator {
    pub fn new(catalog: Arc<dyn PartCatalog>, runner: TroubleshootRunner) -> Self {
        Self {
            catalog,
            runner,
            carts: CartStore::new(),
            conversations: ConversationStore::new(),
        }
    }

    pub async fn handle_message(&self, key: &SessionKey, message: &str) -> Result<ChatResponse> {
        if let Some(step) = self.runner.current(key).await? {
            if EXIT_FLOW.is_match(message) {
                self.runner.exit(key).await?;
                return Ok(ChatResponse::text(
                    key.as_str(),
                    "Okay, I've stopped the troubleshooting questions. What else can I help with?",
                )
                .intent(Intent::Troubleshoot)
                .quick_replies(["Find a part", "Troubleshoot an issue"]));
            }
            if answers_step(&step, message) {
                debug!(session_id = %key, flow_id = %step.flow_id, "Treating message as a step answer");
                let progress = self.runner.answer_current(key, message).await?;
                return self.progress_response(key, progress).await;
            }
        }

        let extraction = extract(message);
        let context = self.conversations.update(key, &extraction.entities);

        info!(
            session_id = %key,
            intent = %extraction.intent,
            confidence = extraction.confidence,
            "Routing chat message"
        );

        let Extraction {
            intent, entities, ..
        } = extraction;

        if is_unsupported_only(&entities) {
            return Ok(self.out_of_scope(key, &entities));
        }

        match intent {
            Intent::PartLookup => self.part_lookup(key, message, &entities, &context).await,
            Intent::CompatibilityCheck => self.compatibility(key, &entities, &context).await,
            Intent::InstallHelp => self.install_help(key, &entities, &context).await,
            Intent::Troubleshoot => self.troubleshoot(key, message, &entities, &context).await,
            Intent::CartAction => self.cart_action(key, message, &entities, &context).await,
            Intent::OrderSupport => Ok(ChatResponse::text(key.as_str(), ORDER_SUPPORT)
                .intent(Intent::OrderSupport)
                .quick_replies(["Returns policy", "Find a part"])),
            Intent::ReturnsPolicy => Ok(ChatResponse::text(key.as_str(), RETURNS_POLICY)
                .intent(Intent::ReturnsPolicy)
                .quick_replies(["Start return", "Contact support"])),
            Intent::OutOfScope => Ok(self.out_of_scope(key, &entities)),
        }
    }

    /// Answer a step card the client rendered
    pub async fn handle_answer(
        &self,
        key: &SessionKey,
        flow_id: &str,
        step_number: u32,
        answer: &str,
    ) -> Result<ChatResponse> {
        match self.runner.answer(key, flow_id, step_number, answer).await {
            Ok(progress) => self.progress_response(key, progress).await,
            Err(FlowError::InvalidAnswer { .. }) => {
                // re-prompt with whatever step the session is really at
                match self.runner.current(key).await? {
                    Some(step) => Ok(ChatResponse::text(
                        key.as_str(),
                        "Please pick one of the options for this question.",
                    )
                    .intent(Intent::Troubleshoot)
                    .source(ResponseSource::Flow)
                    .card(Card::troubleshoot_step(&step))
                    .quick_replies(option_labels(&step))),
                    None => Ok(no_active_flow(key)),
                }
            }
            Err(FlowError::SessionNotFound(_)) => Ok(no_active_flow(key)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exit_troubleshooting(&self, key: &SessionKey) -> Result<bool> {
        Ok(self.runner.exit(key).await?)
    }

    /// Forget everything held for a conversation: active flow, cart and context
    pub async fn end_session(&self, key: &SessionKey) -> Result<bool> {
        let had_flow = self.runner.exit(key).await?;
        let had_cart = self.carts.clear(key);
        let had_context = self.conversations.forget(key);
        info!(session_id = %key, had_flow, had_cart, had_context, "Session ended");
        Ok(had_flow || had_cart || had_context)
    }

    pub async fn current_step(&self, key: &SessionKey) -> Result<Option<StepView>> {
        Ok(self.runner.current(key).await?)
    }

    pub async fn cart(&self, key: &SessionKey) -> Result<CartCard> {
        let mut lines = Vec::new();
        let mut total_cents = 0u64;
        let mut item_count = 0u32;
        for item in self.carts.items(key) {
            let part = self.catalog.get_part(&item.partselect_number).await?;
            let price_cents = part.as_ref().and_then(|p| p.price_cents);
            total_cents = total_cents.saturating_add(
                u64::from(price_cents.unwrap_or(0)).saturating_mul(u64::from(item.quantity)),
            );
            item_count = item_count.saturating_add(item.quantity);
            lines.push(CartLine {
                name: part.map(|p| p.name),
                price_cents,
                item,
            });
        }
        Ok(CartCard {
            items: lines,
            item_count,
            total_cents,
        })
    }

    async fn progress_response(&self, key: &SessionKey, progress: Progress) -> Result<ChatResponse> {
        match progress {
            Progress::Step(step) => Ok(ChatResponse::text(key.as_str(), step.question.clone())
                .intent(Intent::Troubleshoot)
                .source(ResponseSource::Flow)
                .card(Card::troubleshoot_step(&step))
                .quick_replies(option_labels(&step))),
            Progress::Complete(outcome) => {
                let model = self.conversations.get(key).model_number;
                let mut cards = vec![Card::troubleshoot_result(&outcome)];
                for number in outcome.parts() {
                    if let Some(part) = self.catalog.get_part(&number).await? {
                        cards.push(product_card(&part, model.as_deref()));
                    }
                }

                let mut text = outcome
                    .summary
                    .clone()
                    .unwrap_or_else(|| "Here's what most likely explains the problem.".to_string());
                if cards.len() > 1 && model.is_none() {
                    text.push_str(" Share your model number and I'll confirm these parts fit.");
                }
                if let Some(first) = outcome.parts().first() {
                    self.conversations.remember_part(key, first);
                }

                Ok(ChatResponse::text(key.as_str(), text)
                    .intent(Intent::Troubleshoot)
                    .source(ResponseSource::Flow)
                    .cards(cards)
                    .quick_replies(["Add to cart", "Installation help", "Troubleshoot another issue"]))
            }
        }
    }

    async fn part_lookup(
        &self,
        key: &SessionKey,
        message: &str,
        entities: &Entities,
        context: &ConversationContext,
    ) -> Result<ChatResponse> {
        if let Some(number) = &entities.part_number {
            return Ok(match self.catalog.get_part(number).await? {
                Some(part) => ChatResponse::text(
                    key.as_str(),
                    format!("Here's the information for {}:", part.name),
                )
                .intent(Intent::PartLookup)
                .source(ResponseSource::Catalog)
                .card(product_card(&part, context.model_number.as_deref()))
                .quick_replies(["Check compatibility", "Installation instructions", "Add to cart"]),
                None => ChatResponse::text(
                    key.as_str(),
                    format!(
                        "I don't have {number} in the catalog yet. You can verify it directly on PartSelect, and I can still help with fit checks."
                    ),
                )
                .intent(Intent::PartLookup)
                .quick_replies(["Check compatibility", "Search another part"]),
            });
        }

        let lower = message.to_lowercase();
        let terms: Vec<&str> = SEARCH_TERMS
            .iter()
            .copied()
            .filter(|term| lower.contains(term))
            .collect();

        if terms.is_empty() {
            let text = match &entities.model_number {
                Some(model) => format!(
                    "Which part do you need for model {model}? Describe it (for example \"water filter\") or share the PartSelect number (PS...)."
                ),
                None => "Which part are you looking for? Describe it (for example \"water filter\") or share the PartSelect number (PS...).".to_string(),
            };
            return Ok(ChatResponse::text(key.as_str(), text)
                .intent(Intent::PartLookup)
                .quick_replies(["Example: PS11701542", "Troubleshoot an issue"]));
        }

        let parts = self
            .catalog
            .search_by_name(&terms, context.appliance, MAX_PRODUCT_CARDS)
            .await?;
        if parts.is_empty() {
            return Ok(ChatResponse::text(
                key.as_str(),
                "I couldn't find any parts matching your search. Could you provide more details or a specific part number?",
            )
            .intent(Intent::PartLookup));
        }

        Ok(ChatResponse::text(
            key.as_str(),
            format!("I found {} parts matching your search:", parts.len()),
        )
        .intent(Intent::PartLookup)
        .source(ResponseSource::Catalog)
        .cards(
            parts
                .iter()
                .map(|part| product_card(part, context.model_number.as_deref())),
        )
        .quick_replies(["Check compatibility", "Add to cart"]))
    }

    async fn compatibility(
        &self,
        key: &SessionKey,
        entities: &Entities,
        context: &ConversationContext,
    ) -> Result<ChatResponse> {
        let Some(number) = entities.part_number.as_ref().or(context.part_number.as_ref()) else {
            return Ok(ChatResponse::text(
                key.as_str(),
                "To check compatibility, I need the part number. Please provide the PartSelect number (PS####).",
            )
            .intent(Intent::CompatibilityCheck)
            .quick_replies(["Example: PS11701542"]));
        };
        let Some(model) = entities
            .model_number
            .as_ref()
            .or(context.model_number.as_ref())
        else {
            return Ok(ChatResponse::text(
                key.as_str(),
                "To be sure, I need your appliance model number. You can usually find it on a sticker inside the door or on the frame.",
            )
            .intent(Intent::CompatibilityCheck)
            .quick_replies(["Where's my model number?"]));
        };

        let Some(part) = self.catalog.get_part(number).await? else {
            return Ok(ChatResponse::text(
                key.as_str(),
                format!(
                    "I don't have part {number} in my catalog, so I can't confirm whether it fits model {model}. Please verify the part number."
                ),
            )
            .intent(Intent::CompatibilityCheck)
            .quick_replies(["Search for parts"]));
        };

        self.conversations.remember_part(key, &part.partselect_number);
        if part.fits(model) {
            info!(session_id = %key, part = %part.partselect_number, model = %model, "Compatibility confirmed");
            Ok(ChatResponse::text(
                key.as_str(),
                format!(
                    "Yes. Part {} ({}) is compatible with model {model}.",
                    part.partselect_number, part.name
                ),
            )
            .intent(Intent::CompatibilityCheck)
            .source(ResponseSource::Catalog)
            .card(product_card(&part, Some(model)))
            .quick_replies(["Add to cart", "Installation help"]))
        } else {
            Ok(ChatResponse::text(
                key.as_str(),
                format!(
                    "Part {} ({}) is not listed as compatible with model {model}. Double-check the model number on your appliance label.",
                    part.partselect_number, part.name
                ),
            )
            .intent(Intent::CompatibilityCheck)
            .source(ResponseSource::Catalog)
            .quick_replies(["Where's my model number?", "Find a part"]))
        }
    }

    async fn install_help(
        &self,
        key: &SessionKey,
        entities: &Entities,
        context: &ConversationContext,
    ) -> Result<ChatResponse> {
        let Some(number) = entities.part_number.as_ref().or(context.part_number.as_ref()) else {
            return Ok(ChatResponse::text(
                key.as_str(),
                "Which part do you need installation help with? Please provide the PartSelect number (PS####).",
            )
            .intent(Intent::InstallHelp)
            .quick_replies(["Example: PS11701542"]));
        };

        let Some(part) = self.catalog.get_part(number).await? else {
            return Ok(ChatResponse::text(key.as_str(), format!("I couldn't find part {number}."))
                .intent(Intent::InstallHelp)
                .quick_replies(["Search for parts"]));
        };

        let text = match &part.install_summary {
            Some(summary) => format!("Here's how to install {}:\n\n{summary}", part.name),
            None => format!(
                "I don't have installation steps for {} yet. The product page on PartSelect usually has instructions and videos.",
                part.name
            ),
        };
        Ok(ChatResponse::text(key.as_str(), text)
            .intent(Intent::InstallHelp)
            .source(ResponseSource::Catalog)
            .card(product_card(&part, context.model_number.as_deref()))
            .quick_replies(["Add to cart", "Check compatibility"]))
    }

    async fn troubleshoot(
        &self,
        key: &SessionKey,
        message: &str,
        entities: &Entities,
        context: &ConversationContext,
    ) -> Result<ChatResponse> {
        let Some(appliance) = entities.appliance_type.or(context.appliance) else {
            return Ok(ChatResponse::text(
                key.as_str(),
                "What type of appliance are you troubleshooting? Please mention if it's a refrigerator or dishwasher.",
            )
            .intent(Intent::Troubleshoot)
            .quick_replies(["Refrigerator", "Dishwasher"]));
        };

        let Some(symptom) = entities.symptom else {
            if is_bare_appliance(message) {
                return Ok(ask_symptom(key, appliance));
            }
            return self.start_flow(key, appliance, GENERIC_SYMPTOM_KEY).await;
        };

        if self
            .runner
            .engine()
            .store()
            .find(appliance, symptom.key())
            .is_some()
        {
            return self.start_flow(key, appliance, symptom.key()).await;
        }

        let parts = self
            .catalog
            .search_parts_by_symptom(symptom.phrase(), appliance)
            .await?;
        if !parts.is_empty() {
            info!(
                session_id = %key,
                appliance = %appliance,
                symptom = %symptom,
                matches = parts.len(),
                "No dedicated flow, answering from symptom search"
            );
            return Ok(symptom_results(key, symptom.phrase(), &parts, context));
        }

        debug!(
            session_id = %key,
            appliance = %appliance,
            symptom = %symptom,
            "No flow or catalog match for symptom, starting generic flow"
        );
        match self.start_flow(key, appliance, GENERIC_SYMPTOM_KEY).await {
            Err(ServiceError::Flow(FlowError::FlowNotFound { .. })) => {
                warn!(session_id = %key, appliance = %appliance, "No generic flow registered");
                Ok(ChatResponse::text(
                    key.as_str(),
                    format!(
                        "I don't have a guided check for a {appliance} that is {}. Can you describe what you're seeing in more detail?",
                        symptom.phrase()
                    ),
                )
                .intent(Intent::Troubleshoot))
            }
            other => other,
        }
    }

    async fn start_flow(
        &self,
        key: &SessionKey,
        appliance: ApplianceType,
        symptom_key: &str,
    ) -> Result<ChatResponse> {
        let step = self
            .runner
            .start_with_fallback(key, appliance, symptom_key)
            .await?;
        Ok(ChatResponse::text(
            key.as_str(),
            format!(
                "Let me help you troubleshoot. I'll ask a few targeted questions.\n\n{}",
                step.question
            ),
        )
        .intent(Intent::Troubleshoot)
        .source(ResponseSource::Flow)
        .card(Card::troubleshoot_step(&step))
        .quick_replies(option_labels(&step)))
    }

    async fn cart_action(
        &self,
        key: &SessionKey,
        message: &str,
        entities: &Entities,
        context: &ConversationContext,
    ) -> Result<ChatResponse> {
        let command = CartCommand::parse(message);
        debug!(session_id = %key, command = ?command, "Cart command");

        match command {
            CartCommand::Add { quantity } => {
                let Some(number) = entities.part_number.as_ref().or(context.part_number.as_ref())
                else {
                    return Ok(ChatResponse::text(
                        key.as_str(),
                        "Which part would you like to add? Share the PartSelect number (PS####).",
                    )
                    .intent(Intent::CartAction)
                    .quick_replies(["Find a part"]));
                };
                let Some(part) = self.catalog.get_part(number).await? else {
                    return Ok(ChatResponse::text(
                        key.as_str(),
                        format!("I couldn't find part {number}, so I didn't add it to your cart."),
                    )
                    .intent(Intent::CartAction));
                };

                let line_quantity = self.carts.add(key, &part.partselect_number, quantity);
                self.conversations.remember_part(key, &part.partselect_number);
                info!(session_id = %key, part = %part.partselect_number, quantity, "Added to cart");

                Ok(ChatResponse::text(
                    key.as_str(),
                    format!("Added {} to your cart (quantity {line_quantity}).", part.name),
                )
                .intent(Intent::CartAction)
                .card(Card::cart(self.cart(key).await?))
                .quick_replies(["View cart", "Checkout", "Find more parts"]))
            }
            CartCommand::SetQuantity(quantity) => {
                let Some(number) = entities
                    .part_number
                    .clone()
                    .or_else(|| self.carts.last_added(key))
                else {
                    return Ok(empty_cart(key));
                };
                if !self.carts.set_quantity(key, &number, quantity) {
                    return Ok(ChatResponse::text(
                        key.as_str(),
                        format!("{number} isn't in your cart."),
                    )
                    .intent(Intent::CartAction)
                    .quick_replies(["View cart"]));
                }
                Ok(ChatResponse::text(
                    key.as_str(),
                    format!("Updated {number} quantity to {quantity}."),
                )
                .intent(Intent::CartAction)
                .card(Card::cart(self.cart(key).await?))
                .quick_replies(["View cart", "Checkout", "Find more parts"]))
            }
            CartCommand::Remove => {
                let Some(number) = entities
                    .part_number
                    .clone()
                    .or_else(|| self.carts.last_added(key))
                else {
                    return Ok(empty_cart(key));
                };
                let text = if self.carts.remove(key, &number) {
                    format!("Removed {number} from your cart.")
                } else {
                    format!("{number} isn't in your cart.")
                };
                Ok(ChatResponse::text(key.as_str(), text)
                    .intent(Intent::CartAction)
                    .card(Card::cart(self.cart(key).await?))
                    .quick_replies(["View cart", "Find more parts"]))
            }
            CartCommand::View => {
                let cart = self.cart(key).await?;
                if cart.items.is_empty() {
                    return Ok(empty_cart(key));
                }
                Ok(ChatResponse::text(
                    key.as_str(),
                    format!(
                        "Your cart has {} {}. Subtotal: {}",
                        cart.item_count,
                        plural(cart.item_count, "item"),
                        dollars(cart.total_cents)
                    ),
                )
                .intent(Intent::CartAction)
                .card(Card::cart(cart))
                .quick_replies(["Checkout", "Find more parts", "Remove from cart"]))
            }
            CartCommand::Checkout => {
                let cart = self.cart(key).await?;
                if cart.items.is_empty() {
                    return Ok(ChatResponse::text(
                        key.as_str(),
                        "Your cart is empty. Add some parts first!",
                    )
                    .intent(Intent::CartAction)
                    .quick_replies(["Find a part"]));
                }
                Ok(ChatResponse::text(
                    key.as_str(),
                    format!(
                        "Ready to check out: {} {}, total {}. To complete your order, visit PartSelect.com.",
                        cart.item_count,
                        plural(cart.item_count, "item"),
                        dollars(cart.total_cents)
                    ),
                )
                .intent(Intent::CartAction)
                .card(Card::cart(cart))
                .quick_replies(["Installation help", "Check compatibility"]))
            }
        }
    }

    fn out_of_scope(&self, key: &SessionKey, entities: &Entities) -> ChatResponse {
        let text = match &entities.unsupported_appliance {
            Some(appliance) => format!(
                "I'm focused on refrigerator and dishwasher parts right now. I can't help with {appliance} parts or issues."
            ),
            None => "I'm focused on refrigerator and dishwasher parts right now.".to_string(),
        };
        ChatResponse::text(key.as_str(), text)
            .intent(Intent::OutOfScope)
            .card(Card::out_of_scope())
            .quick_replies([
                "Find refrigerator parts",
                "Find dishwasher parts",
                "Troubleshoot an issue",
            ])
    }
}

fn product_card(part: &Part, model: Option<&str>) -> Card {
    let fits = model.filter(|m| part.fits(m));
    Card::product(part, fits)
}

fn symptom_results(
    key: &SessionKey,
    phrase: &str,
    parts: &[Part],
    context: &ConversationContext,
) -> ChatResponse {
    let text = match &context.model_number {
        Some(model) => format!(
            "Based on the symptom '{phrase}', here are parts that commonly fix this issue. I'll check them against your model {model}."
        ),
        None => format!(
            "Based on the symptom '{phrase}', here are parts that commonly fix this issue. To verify fit, please share your appliance's model number."
        ),
    };
    ChatResponse::text(key.as_str(), text)
        .intent(Intent::Troubleshoot)
        .source(ResponseSource::Catalog)
        .cards(
            parts
                .iter()
                .take(MAX_PRODUCT_CARDS)
                .map(|part| product_card(part, context.model_number.as_deref())),
        )
        .quick_replies(["Where's my model number?", "Troubleshoot another issue"])
}

fn option_labels(step: &StepView) -> Vec<String> {
    step.options.iter().map(|o| o.label.clone()).collect()
}

/// Whether a free-text message picks one of the step's options
fn answers_step(step: &StepView, message: &str) -> bool {
    let message = message.trim();
    step.options.iter().any(|option| {
        option.value.eq_ignore_ascii_case(message) || option.label.eq_ignore_ascii_case(message)
    })
}

fn is_unsupported_only(entities: &Entities) -> bool {
    entities.unsupported_appliance.is_some()
        && entities.appliance_type.is_none()
        && !entities.has_identifier()
}

fn is_bare_appliance(message: &str) -> bool {
    message.trim().parse::<ApplianceType>().is_ok()
}

fn ask_symptom(key: &SessionKey, appliance: ApplianceType) -> ChatResponse {
    let replies: &[&str] = match appliance {
        ApplianceType::Refrigerator => &[
            "Ice maker not making ice",
            "Refrigerator not cooling",
            "Refrigerator leaking",
            "Other issue",
        ],
        ApplianceType::Dishwasher => &[
            "Dishwasher not cleaning",
            "Dishwasher not draining",
            "Dishwasher not drying",
            "Other issue",
        ],
    };
    ChatResponse::text(
        key.as_str(),
        format!("What issue are you experiencing with your {appliance}?"),
    )
    .intent(Intent::Troubleshoot)
    .quick_replies(replies.iter().copied())
}

fn no_active_flow(key: &SessionKey) -> ChatResponse {
    ChatResponse::text(
        key.as_str(),
        "There's no troubleshooting in progress. Tell me what's wrong with your refrigerator or dishwasher to start.",
    )
    .intent(Intent::Troubleshoot)
    .quick_replies(["Refrigerator", "Dishwasher"])
}

fn empty_cart(key: &SessionKey) -> ChatResponse {
    ChatResponse::text(
        key.as_str(),
        "Your cart is empty. Would you like to find some parts?",
    )
    .intent(Intent::CartAction)
    .quick_replies(["Find a part", "Troubleshoot an issue"])
}

fn plural(count: u32, noun: &str) -> String {
    if count == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    }
}

fn dollars(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::models::CardBody;
    use parts_flow::{FlowEngine, InMemoryFlowSessionStorage, InMemoryFlowStore};

    fn orchestrator() -> ChatOrchestrator {
        let store = Arc::new(InMemoryFlowStore::builtin().unwrap());
        let runner = TroubleshootRunner::new(
            Arc::new(FlowEngine::new(store)),
            Arc::new(InMemoryFlowSessionStorage::new()),
        );
        ChatOrchestrator::new(Arc::new(InMemoryCatalog::seed().unwrap()), runner)
    }

    #[tokio::test]
    async fn test_out_of_scope_card() {
        let response = orchestrator()
            .handle_message(&SessionKey::generate(), "what's the weather like?")
            .await
            .unwrap();
        assert_eq!(response.intent, Some(Intent::OutOfScope));
        assert!(matches!(response.cards[0].body, CardBody::OutOfScope(_)));
    }

    #[tokio::test]
    async fn test_unsupported_appliance_refusal() {
        let response = orchestrator()
            .handle_message(&SessionKey::generate(), "my oven is broken")
            .await
            .unwrap();
        assert_eq!(response.intent, Some(Intent::OutOfScope));
        assert!(response.assistant_text.contains("oven"));
    }

    #[tokio::test]
    async fn test_troubleshoot_asks_for_appliance_then_symptom() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();

        let response = orchestrator
            .handle_message(&key, "I need to troubleshoot something")
            .await
            .unwrap();
        assert_eq!(response.quick_replies, vec!["Refrigerator", "Dishwasher"]);

        let response = orchestrator.handle_message(&key, "Dishwasher").await.unwrap();
        assert!(response.assistant_text.contains("dishwasher"));
        assert!(response.cards.is_empty());
        assert!(orchestrator.current_step(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_free_text_answers_active_step() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();

        let response = orchestrator
            .handle_message(&key, "my fridge is not making ice")
            .await
            .unwrap();
        assert!(matches!(response.cards[0].body, CardBody::TroubleshootStep(_)));

        let response = orchestrator.handle_message(&key, "No").await.unwrap();
        assert!(matches!(response.cards[0].body, CardBody::TroubleshootResult(_)));
        let CardBody::Product(product) = &response.cards[1].body else {
            panic!("expected a product card for the recommended part");
        };
        assert_eq!(product.partselect_number, "PS11701542");
        assert!(orchestrator.current_step(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exit_message_leaves_flow() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();
        orchestrator
            .handle_message(&key, "dishwasher not draining")
            .await
            .unwrap();
        assert!(orchestrator.current_step(&key).await.unwrap().is_some());

        orchestrator.handle_message(&key, "cancel").await.unwrap();
        assert!(orchestrator.current_step(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_symptom_without_flow_searches_catalog() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();
        let response = orchestrator
            .handle_message(&key, "my dishwasher is not drying")
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Catalog);
        let numbers: Vec<&str> = response
            .cards
            .iter()
            .filter_map(|card| match &card.body {
                CardBody::Product(product) => Some(product.partselect_number.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec!["PS11748510"]);
        assert!(orchestrator.current_step(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_symptom_without_parts_uses_generic_flow() {
        let catalog = InMemoryCatalog::from_parts(Vec::new());
        let store = Arc::new(InMemoryFlowStore::builtin().unwrap());
        let runner = TroubleshootRunner::new(
            Arc::new(FlowEngine::new(store)),
            Arc::new(InMemoryFlowSessionStorage::new()),
        );
        let orchestrator = ChatOrchestrator::new(Arc::new(catalog), runner);
        let key = SessionKey::generate();

        let response = orchestrator
            .handle_message(&key, "my dishwasher is really noisy")
            .await
            .unwrap();
        assert_eq!(response.source, ResponseSource::Flow);
        let step = orchestrator.current_step(&key).await.unwrap().unwrap();
        assert_eq!(step.flow_id, "dishwasher_generic");
    }

    #[tokio::test]
    async fn test_ice_maker_example_starts_ice_maker_flow() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();
        orchestrator
            .handle_message(&key, "The ice maker on my Whirlpool fridge is not working")
            .await
            .unwrap();
        let step = orchestrator.current_step(&key).await.unwrap().unwrap();
        assert_eq!(step.flow_id, "refrigerator_ice_maker");
    }

    #[tokio::test]
    async fn test_compatibility_uses_context() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();

        let response = orchestrator
            .handle_message(&key, "Is PS11756150 compatible with my dishwasher?")
            .await
            .unwrap();
        assert!(response.assistant_text.contains("model number"));

        let response = orchestrator
            .handle_message(&key, "Does it fit model WDT780SAEM1?")
            .await
            .unwrap();
        assert_eq!(response.intent, Some(Intent::CompatibilityCheck));
        assert!(response.assistant_text.starts_with("Yes."));
    }

    #[tokio::test]
    async fn test_install_help() {
        let response = orchestrator()
            .handle_message(&SessionKey::generate(), "How can I install part PS11752778?")
            .await
            .unwrap();
        assert_eq!(response.intent, Some(Intent::InstallHelp));
        assert!(response.assistant_text.contains("Ice Maker Assembly"));
    }

    #[tokio::test]
    async fn test_cart_add_update_view() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();

        orchestrator
            .handle_message(&key, "add PS11701542 to my cart")
            .await
            .unwrap();
        orchestrator.handle_message(&key, "make that 2").await.unwrap();

        let cart = orchestrator.cart(&key).await.unwrap();
        assert_eq!(cart.item_count, 2);
        assert_eq!(cart.total_cents, 2 * 5499);

        let response = orchestrator
            .handle_message(&key, "show my cart")
            .await
            .unwrap();
        assert!(response.assistant_text.contains("$109.98"));
    }

    #[tokio::test]
    async fn test_cart_totals_saturate() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();
        orchestrator.carts.add(&key, "PS11701542", u32::MAX);
        orchestrator.carts.add(&key, "PS429868", u32::MAX);

        let cart = orchestrator.cart(&key).await.unwrap();
        assert_eq!(cart.item_count, u32::MAX);
        assert!(cart.total_cents > 0);
    }

    #[tokio::test]
    async fn test_end_session_clears_state() {
        let orchestrator = orchestrator();
        let key = SessionKey::generate();
        orchestrator
            .handle_message(&key, "add PS11701542 to my cart")
            .await
            .unwrap();
        orchestrator
            .handle_message(&key, "my dishwasher is not draining")
            .await
            .unwrap();

        assert!(orchestrator.end_session(&key).await.unwrap());
        assert!(orchestrator.current_step(&key).await.unwrap().is_none());
        assert!(orchestrator.cart(&key).await.unwrap().items.is_empty());
        assert_eq!(orchestrator.conversations.get(&key), ConversationContext::default());
        assert!(!orchestrator.end_session(&key).await.unwrap());
    }

    #[test]
    fn test_dollars() {
        assert_eq!(dollars(5499), "$54.99");
        assert_eq!(dollars(5), "$0.05");
    }
}
