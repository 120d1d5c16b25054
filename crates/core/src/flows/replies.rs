use crate::catalog::Catalog;
use crate::flows::states::{Conversation, ConversationState};

pub const GREETING: &str = "Hello!";
pub const CAPABILITIES: &str = "I'm a bot. You can ask me to show you the menu or order the pizza straight away if you know what you want.";
pub const MENU_HEADER: &str = "Here is the menu:";
pub const ANYTHING_ELSE: &str = "Anything else?";
pub const AMOUNTS_MISSING: &str = "Please specify the amount of each pizza you want.";
pub const CONTACT_DETAILS_INTRO: &str = "Great! Now I will ask you about your contact details. In the next steps you will need to specify your name, city, postal code and street & street number.";
pub const ASK_NAME: &str = "What's your name?";
pub const ASK_CITY: &str = "What city do you live in?";
pub const ASK_POSTCODE: &str = "Postcode?";
pub const INVALID_POSTCODE: &str = "Please provide correct 5 digit postcode.";
pub const ASK_STREET: &str = "To finish, I need your street name and house number.";
pub const INVALID_STREET: &str = "Please provide the street name and your house number.";
pub const CONFIRM_ADDRESS: &str = "Is this correct?";
pub const ASK_CORRECTION: &str = "What's wrong?";
pub const SUMMARY_HEADER: &str = "Here is the summary of your order:";
pub const CANCELLED: &str = "Cancelling order process. Bye!";
pub const NOT_UNDERSTOOD: &str = "I'm sorry, I don't understand - I'm just a bot.";

/// Reply plan chosen by a rule, rendered after its effects are applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Greeting,
    Menu { ingredient: String },
    OrderUpdated,
    AmountsMissing,
    UnknownPizza { name: String },
    AskName,
    RepeatName,
    AskCity,
    AskPostcode,
    InvalidPostcode,
    AskStreet,
    InvalidStreet,
    ConfirmAddress,
    AskCorrection,
    Summary { eta_minutes: u32 },
    Complaint { complaint: String, eta_minutes: u32 },
    Cancelled,
    Fallback { state: ConversationState },
}

impl Reply {
    pub fn render(&self, conversation: &Conversation, catalog: &Catalog) -> Vec<String> {
        match self {
            Self::Greeting => vec![GREETING.to_owned(), CAPABILITIES.to_owned()],
            Self::Menu { ingredient } => vec![menu(catalog, ingredient)],
            Self::OrderUpdated => {
                vec![conversation.order.summary_text(), ANYTHING_ELSE.to_owned()]
            }
            Self::AmountsMissing => vec![AMOUNTS_MISSING.to_owned()],
            Self::UnknownPizza { name } => vec![format!(
                "Sorry, we don't have {name} on the menu. Please choose a pizza from the menu."
            )],
            Self::AskName => vec![CONTACT_DETAILS_INTRO.to_owned(), ASK_NAME.to_owned()],
            Self::RepeatName => vec![ASK_NAME.to_owned()],
            Self::AskCity => vec![ASK_CITY.to_owned()],
            Self::AskPostcode => vec![ASK_POSTCODE.to_owned()],
            Self::InvalidPostcode => vec![INVALID_POSTCODE.to_owned()],
            Self::AskStreet => vec![ASK_STREET.to_owned()],
            Self::InvalidStreet => vec![INVALID_STREET.to_owned()],
            Self::ConfirmAddress => confirm_address(conversation),
            Self::AskCorrection => vec![ASK_CORRECTION.to_owned()],
            Self::Summary { eta_minutes } => summary(conversation, *eta_minutes),
            Self::Complaint { complaint, eta_minutes } => {
                let mut lines = vec![format!("OK, we do not have time for that! ({complaint})")];
                lines.extend(summary(conversation, *eta_minutes));
                lines
            }
            Self::Cancelled => vec![CANCELLED.to_owned()],
            Self::Fallback { state } => fallback(*state, conversation),
        }
    }
}

fn menu(catalog: &Catalog, ingredient: &str) -> String {
    let pizzas = catalog.filter_by_ingredient(ingredient);
    if pizzas.is_empty() {
        return format!("Sorry, none of our pizzas come with {ingredient}.");
    }

    let mut text = MENU_HEADER.to_owned();
    for pizza in pizzas {
        text.push_str(&format!("\n- {pizza}"));
    }
    text
}

fn confirm_address(conversation: &Conversation) -> Vec<String> {
    vec![conversation.address.render(), CONFIRM_ADDRESS.to_owned()]
}

fn summary(conversation: &Conversation, eta_minutes: u32) -> Vec<String> {
    vec![
        format!(
            "{SUMMARY_HEADER}\n{}\n{}",
            conversation.order.summary_text(),
            conversation.address.render()
        ),
        format!("Hold tight. We will be there in {eta_minutes} minutes!"),
    ]
}

fn fallback(state: ConversationState, conversation: &Conversation) -> Vec<String> {
    use ConversationState::*;

    let delivery = format!("{NOT_UNDERSTOOD} I need to know where to deliver your order.");
    match state {
        Greeting | Order => vec![format!(
            "{NOT_UNDERSTOOD} You can ask me to show you the menu or go straight to ordering your pizza if you are familiar with the process."
        )],
        AddressStart => vec![delivery, CONTACT_DETAILS_INTRO.to_owned(), ASK_NAME.to_owned()],
        AddressName => vec![delivery, ASK_CITY.to_owned()],
        AddressCity => vec![delivery, ASK_POSTCODE.to_owned()],
        AddressCode => vec![delivery, ASK_STREET.to_owned()],
        AddressStreet => {
            let mut lines = vec![format!(
                "{NOT_UNDERSTOOD} Please tell me whether the address above is correct."
            )];
            lines.extend(confirm_address(conversation));
            lines
        }
        Correction => {
            vec![format!("{NOT_UNDERSTOOD} Please tell me what is wrong with your order.")]
        }
        Summary => vec![format!(
            "{NOT_UNDERSTOOD} Your order is already on its way. Say bye to start a new one."
        )],
    }
}
