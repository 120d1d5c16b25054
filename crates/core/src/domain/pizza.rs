use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A menu item. Identity is the name; ingredients keep their listed order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pizza {
    pub name: String,
    pub ingredients: Vec<String>,
}

impl Pizza {
    pub fn new<I, S>(name: impl Into<String>, ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: name.into(), ingredients: ingredients.into_iter().map(Into::into).collect() }
    }

    pub fn has_ingredient(&self, ingredient: &str) -> bool {
        self.ingredients.iter().any(|candidate| candidate == ingredient)
    }
}

impl PartialEq for Pizza {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Pizza {}

impl Hash for Pizza {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Pizza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.ingredients.join(", "))
    }
}
