use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::domain::address::Address;
use crate::domain::order::Order;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Greeting,
    Order,
    AddressStart,
    AddressName,
    AddressCity,
    AddressCode,
    AddressStreet,
    Correction,
    Summary,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Order => "order",
            Self::AddressStart => "address_start",
            Self::AddressName => "address_name",
            Self::AddressCity => "address_city",
            Self::AddressCode => "address_code",
            Self::AddressStreet => "address_street",
            Self::Correction => "correction",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation of the order or address requested by a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEffect {
    AddPizza { pizza: String, amount: u32 },
    SetName { name: String },
    SetCity { city: String },
    SetCode { code: String },
    SetStreet { name: String, number: String },
    Reset,
}

/// Which entry of the priority table produced a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationRule {
    Greeting,
    Menu,
    IngredientMenu,
    PlaceOrder,
    FinishOrder,
    ContactName,
    City,
    Postcode,
    Street,
    RejectAddress,
    ConfirmAddress,
    Complaint,
    Cancel,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    pub rule: ConversationRule,
    pub effects: Vec<ConversationEffect>,
    pub replies: Vec<String>,
}

/// One customer's progress through ordering and delivery details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub state: ConversationState,
    pub order: Order,
    pub address: Address,
}

impl Conversation {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            state: ConversationState::Greeting,
            order: Order::new(catalog),
            address: Address::default(),
        }
    }

    pub fn apply(&mut self, outcome: &TransitionOutcome) -> Result<(), DomainError> {
        if outcome.from != self.state {
            return Err(DomainError::InvariantViolation(format!(
                "transition computed from {} applied to conversation in {}",
                outcome.from, self.state
            )));
        }
        self.apply_effects(&outcome.effects)?;
        self.state = outcome.to;
        Ok(())
    }

    pub(crate) fn apply_effects(&mut self, effects: &[ConversationEffect]) -> Result<(), DomainError> {
        for effect in effects {
            match effect {
                ConversationEffect::AddPizza { pizza, amount } => {
                    self.order.add_pizza(pizza, *amount)?
                }
                ConversationEffect::SetName { name } => self.address.set_name(name.as_str()),
                ConversationEffect::SetCity { city } => self.address.set_city(city.as_str()),
                ConversationEffect::SetCode { code } => self.address.set_code(code.as_str()),
                ConversationEffect::SetStreet { name, number } => {
                    self.address.set_street(name.as_str(), number.as_str())
                }
                ConversationEffect::Reset => {
                    self.order.reset();
                    self.address = Address::default();
                }
            }
        }
        Ok(())
    }
}
