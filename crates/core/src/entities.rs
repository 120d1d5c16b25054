use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity labels the conversation reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Greetings,
    IntentMenu,
    IntentIngredient,
    IntentOrder,
    IntentNo,
    IntentYes,
    IntentWrong,
    Bye,
    Contact,
    City,
    Number,
    StreetName,
    StreetNumber,
    PizzaType,
    PizzaAmount,
    PizzaIngredient,
}

impl EntityKind {
    pub const ALL: [EntityKind; 16] = [
        Self::Greetings,
        Self::IntentMenu,
        Self::IntentIngredient,
        Self::IntentOrder,
        Self::IntentNo,
        Self::IntentYes,
        Self::IntentWrong,
        Self::Bye,
        Self::Contact,
        Self::City,
        Self::Number,
        Self::StreetName,
        Self::StreetNumber,
        Self::PizzaType,
        Self::PizzaAmount,
        Self::PizzaIngredient,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Greetings => "greetings",
            Self::IntentMenu => "intent_menu",
            Self::IntentIngredient => "intent_ingredient",
            Self::IntentOrder => "intent_order",
            Self::IntentNo => "intent_no",
            Self::IntentYes => "intent_yes",
            Self::IntentWrong => "intent_wrong",
            Self::Bye => "bye",
            Self::Contact => "contact",
            Self::City => "city",
            Self::Number => "number",
            Self::StreetName => "street_name",
            Self::StreetNumber => "street_number",
            Self::PizzaType => "pizza_type",
            Self::PizzaAmount => "pizza_amount",
            Self::PizzaIngredient => "pizza_ingredient",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityValue {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl EntityValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self { value: value.into(), confidence: None }
    }

    /// Strings are returned verbatim; any other JSON value uses its JSON form.
    pub fn as_text(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Entities extracted from one message, keyed by label.
///
/// Backed by an ordered map so the order in which the language service lists
/// the labels never influences dispatch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityMap {
    entries: BTreeMap<String, Vec<EntityValue>>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: EntityKind, value: impl Into<Value>) -> Self {
        self.push(kind.label(), EntityValue::new(value));
        self
    }

    pub fn push(&mut self, label: impl Into<String>, value: EntityValue) {
        self.entries.entry(label.into()).or_default().push(value);
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.entries.contains_key(kind.label())
    }

    pub fn values(&self, kind: EntityKind) -> Option<&[EntityValue]> {
        self.entries.get(kind.label()).map(Vec::as_slice)
    }

    pub fn first_text(&self, kind: EntityKind) -> Option<String> {
        self.values(kind).and_then(|values| values.first()).map(EntityValue::as_text)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<EntityValue>)> for EntityMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<EntityValue>)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

/// Decoded body of one classification call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NluResponse {
    #[serde(rename = "_text", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: EntityMap,
}
