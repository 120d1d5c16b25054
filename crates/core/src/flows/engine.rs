use std::sync::Arc;

use serde_json::Value;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::catalog::{Catalog, DEFAULT_MENU_INGREDIENT};
use crate::domain::address::{capitalize, validate_code};
use crate::entities::{EntityKind, EntityMap, EntityValue};
use crate::errors::DomainError;
use crate::flows::replies::Reply;
use crate::flows::states::{
    Conversation, ConversationEffect, ConversationRule, ConversationState, TransitionOutcome,
};

pub const DEFAULT_DELIVERY_ETA_MINUTES: u32 = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub default_ingredient: String,
    pub delivery_eta_minutes: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_ingredient: DEFAULT_MENU_INGREDIENT.to_owned(),
            delivery_eta_minutes: DEFAULT_DELIVERY_ETA_MINUTES,
        }
    }
}

struct Step {
    to: ConversationState,
    effects: Vec<ConversationEffect>,
    reply: Reply,
}

impl Step {
    fn new(to: ConversationState, reply: Reply) -> Self {
        Self { to, effects: Vec::new(), reply }
    }

    fn with_effect(mut self, effect: ConversationEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

type RuleHandler = fn(&ConversationEngine, &Conversation, &EntityMap) -> Step;

struct TransitionRule {
    rule: ConversationRule,
    trigger: EntityKind,
    guard: Option<ConversationState>,
    handler: RuleHandler,
}

impl TransitionRule {
    fn matches(&self, state: ConversationState, entities: &EntityMap) -> bool {
        entities.contains(self.trigger) && self.guard.map_or(true, |required| required == state)
    }
}

/// Evaluated top to bottom; the first matching row fires.
const RULES: &[TransitionRule] = &[
    TransitionRule {
        rule: ConversationRule::Greeting,
        trigger: EntityKind::Greetings,
        guard: None,
        handler: greet,
    },
    TransitionRule {
        rule: ConversationRule::Menu,
        trigger: EntityKind::IntentMenu,
        guard: None,
        handler: show_menu,
    },
    TransitionRule {
        rule: ConversationRule::IngredientMenu,
        trigger: EntityKind::IntentIngredient,
        guard: None,
        handler: show_menu,
    },
    TransitionRule {
        rule: ConversationRule::PlaceOrder,
        trigger: EntityKind::IntentOrder,
        guard: None,
        handler: place_order,
    },
    TransitionRule {
        rule: ConversationRule::FinishOrder,
        trigger: EntityKind::IntentNo,
        guard: Some(ConversationState::Order),
        handler: finish_order,
    },
    TransitionRule {
        rule: ConversationRule::ContactName,
        trigger: EntityKind::Contact,
        guard: Some(ConversationState::AddressStart),
        handler: store_name,
    },
    TransitionRule {
        rule: ConversationRule::City,
        trigger: EntityKind::City,
        guard: Some(ConversationState::AddressName),
        handler: store_city,
    },
    TransitionRule {
        rule: ConversationRule::Postcode,
        trigger: EntityKind::Number,
        guard: Some(ConversationState::AddressCity),
        handler: store_postcode,
    },
    TransitionRule {
        rule: ConversationRule::Street,
        trigger: EntityKind::StreetName,
        guard: Some(ConversationState::AddressCode),
        handler: store_street,
    },
    TransitionRule {
        rule: ConversationRule::RejectAddress,
        trigger: EntityKind::IntentNo,
        guard: Some(ConversationState::AddressStreet),
        handler: reject_address,
    },
    TransitionRule {
        rule: ConversationRule::ConfirmAddress,
        trigger: EntityKind::IntentYes,
        guard: Some(ConversationState::AddressStreet),
        handler: confirm_address,
    },
    TransitionRule {
        rule: ConversationRule::Complaint,
        trigger: EntityKind::IntentWrong,
        guard: Some(ConversationState::Correction),
        handler: acknowledge_complaint,
    },
    TransitionRule {
        rule: ConversationRule::Cancel,
        trigger: EntityKind::Bye,
        guard: None,
        handler: cancel,
    },
];

/// Maps (conversation, recognized entities) to the next state, the effects
/// on the order and address, and the reply lines.
#[derive(Clone, Debug)]
pub struct ConversationEngine {
    catalog: Arc<Catalog>,
    settings: EngineSettings,
}

impl Default for ConversationEngine {
    fn default() -> Self {
        Self::new(Arc::new(Catalog::default()), EngineSettings::default())
    }
}

impl ConversationEngine {
    pub fn new(catalog: Arc<Catalog>, settings: EngineSettings) -> Self {
        Self { catalog, settings }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn start(&self) -> Conversation {
        Conversation::new(&self.catalog)
    }

    /// Computes the transition without touching `current`; apply the result
    /// with [`Conversation::apply`].
    pub fn transition(
        &self,
        current: &Conversation,
        entities: &EntityMap,
    ) -> Result<TransitionOutcome, DomainError> {
        let (rule, step) = match RULES.iter().find(|row| row.matches(current.state, entities)) {
            Some(row) => (row.rule, (row.handler)(self, current, entities)),
            None => (
                ConversationRule::Fallback,
                Step::new(current.state, Reply::Fallback { state: current.state }),
            ),
        };

        let mut next = current.clone();
        next.apply_effects(&step.effects)?;
        next.state = step.to;
        let replies = step.reply.render(&next, &self.catalog);

        Ok(TransitionOutcome { from: current.state, to: step.to, rule, effects: step.effects, replies })
    }

    pub fn transition_with_audit<S>(
        &self,
        current: &Conversation,
        entities: &EntityMap,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.transition(current, entities);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "conversation.transition_applied",
                        AuditCategory::Conversation,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("rule", format!("{:?}", outcome.rule))
                    .with_metadata("entities", entities.labels().collect::<Vec<_>>().join(",")),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "conversation.transition_rejected",
                        AuditCategory::Conversation,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("state", current.state.as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    fn eta_minutes(&self) -> u32 {
        self.settings.delivery_eta_minutes
    }
}

fn greet(_engine: &ConversationEngine, _current: &Conversation, _entities: &EntityMap) -> Step {
    Step::new(ConversationState::Order, Reply::Greeting)
}

fn show_menu(engine: &ConversationEngine, _current: &Conversation, entities: &EntityMap) -> Step {
    let ingredient = entities
        .first_text(EntityKind::PizzaIngredient)
        .unwrap_or_else(|| engine.settings.default_ingredient.clone());
    Step::new(ConversationState::Order, Reply::Menu { ingredient })
}

fn place_order(engine: &ConversationEngine, _current: &Conversation, entities: &EntityMap) -> Step {
    let (Some(types), Some(amounts)) =
        (entities.values(EntityKind::PizzaType), entities.values(EntityKind::PizzaAmount))
    else {
        return Step::new(ConversationState::Order, Reply::AmountsMissing);
    };

    let mut step = Step::new(ConversationState::Order, Reply::OrderUpdated);
    for (pizza_type, amount) in types.iter().zip(amounts) {
        let name = pizza_type.as_text();
        if engine.catalog.lookup(&name).is_err() {
            return Step::new(ConversationState::Order, Reply::UnknownPizza { name });
        }
        let Some(amount) = parse_amount(amount) else {
            return Step::new(ConversationState::Order, Reply::AmountsMissing);
        };
        step = step.with_effect(ConversationEffect::AddPizza { pizza: name, amount });
    }
    step
}

fn finish_order(_engine: &ConversationEngine, _current: &Conversation, _entities: &EntityMap) -> Step {
    Step::new(ConversationState::AddressStart, Reply::AskName)
}

fn store_name(_engine: &ConversationEngine, _current: &Conversation, entities: &EntityMap) -> Step {
    let Some(name) = non_blank(entities, EntityKind::Contact) else {
        return Step::new(ConversationState::AddressStart, Reply::RepeatName);
    };
    Step::new(ConversationState::AddressName, Reply::AskCity)
        .with_effect(ConversationEffect::SetName { name: capitalize(&name) })
}

fn store_city(_engine: &ConversationEngine, _current: &Conversation, entities: &EntityMap) -> Step {
    let Some(city) = non_blank(entities, EntityKind::City) else {
        return Step::new(ConversationState::AddressName, Reply::AskCity);
    };
    Step::new(ConversationState::AddressCity, Reply::AskPostcode)
        .with_effect(ConversationEffect::SetCity { city: capitalize(&city) })
}

fn non_blank(entities: &EntityMap, kind: EntityKind) -> Option<String> {
    entities.first_text(kind).filter(|text| !text.trim().is_empty())
}

fn store_postcode(_engine: &ConversationEngine, _current: &Conversation, entities: &EntityMap) -> Step {
    let code = entities.first_text(EntityKind::Number).unwrap_or_default();
    if !validate_code(&code) {
        return Step::new(ConversationState::AddressCity, Reply::InvalidPostcode);
    }
    Step::new(ConversationState::AddressCode, Reply::AskStreet)
        .with_effect(ConversationEffect::SetCode { code })
}

fn store_street(_engine: &ConversationEngine, _current: &Conversation, entities: &EntityMap) -> Step {
    let (Some(name), Some(number)) = (
        entities.first_text(EntityKind::StreetName),
        entities.first_text(EntityKind::StreetNumber),
    ) else {
        return Step::new(ConversationState::AddressCode, Reply::InvalidStreet);
    };
    Step::new(ConversationState::AddressStreet, Reply::ConfirmAddress)
        .with_effect(ConversationEffect::SetStreet { name, number })
}

fn reject_address(_engine: &ConversationEngine, _current: &Conversation, _entities: &EntityMap) -> Step {
    Step::new(ConversationState::Correction, Reply::AskCorrection)
}

fn confirm_address(engine: &ConversationEngine, _current: &Conversation, _entities: &EntityMap) -> Step {
    Step::new(ConversationState::Summary, Reply::Summary { eta_minutes: engine.eta_minutes() })
}

fn acknowledge_complaint(
    engine: &ConversationEngine,
    _current: &Conversation,
    entities: &EntityMap,
) -> Step {
    let complaint = entities.first_text(EntityKind::IntentWrong).unwrap_or_default();
    Step::new(
        ConversationState::Summary,
        Reply::Complaint { complaint, eta_minutes: engine.eta_minutes() },
    )
}

fn cancel(_engine: &ConversationEngine, _current: &Conversation, _entities: &EntityMap) -> Step {
    Step::new(ConversationState::Greeting, Reply::Cancelled).with_effect(ConversationEffect::Reset)
}

/// Non-negative whole numbers, given either as JSON numbers or numeric text.
fn parse_amount(amount: &EntityValue) -> Option<u32> {
    match &amount.value {
        Value::Number(number) => {
            if let Some(whole) = number.as_u64() {
                return u32::try_from(whole).ok();
            }
            let float = number.as_f64()?;
            (float >= 0.0 && float.fract() == 0.0 && float <= f64::from(u32::MAX))
                .then_some(float as u32)
        }
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}
