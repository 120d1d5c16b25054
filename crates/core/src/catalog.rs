use std::collections::HashSet;

use crate::domain::pizza::Pizza;
use crate::errors::DomainError;

pub const DEFAULT_MENU_INGREDIENT: &str = "tomato sauce";

/// Orderable pizzas. Iteration order is the order the menu is shown in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    pizzas: Vec<Pizza>,
}

impl Catalog {
    pub fn new(pizzas: Vec<Pizza>) -> Result<Self, DomainError> {
        let mut seen = HashSet::new();
        for pizza in &pizzas {
            if !seen.insert(pizza.name.as_str()) {
                return Err(DomainError::DuplicatePizza { name: pizza.name.clone() });
            }
        }
        Ok(Self { pizzas })
    }

    pub fn lookup(&self, name: &str) -> Result<&Pizza, DomainError> {
        self.pizzas
            .iter()
            .find(|pizza| pizza.name == name)
            .ok_or_else(|| DomainError::UnknownPizza { name: name.to_owned() })
    }

    pub fn filter_by_ingredient(&self, ingredient: &str) -> Vec<&Pizza> {
        self.pizzas.iter().filter(|pizza| pizza.has_ingredient(ingredient)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pizza> {
        self.pizzas.iter()
    }

    pub fn len(&self) -> usize {
        self.pizzas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pizzas.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            pizzas: vec![
                Pizza::new("margherita", ["mozarella", "tomato sauce"]),
                Pizza::new("pepperoni", ["mozarella", "pepperoni", "tomato sauce"]),
                Pizza::new("champignon", ["mozarella", "mushrooms", "onions", "tomato sauce"]),
                Pizza::new("veggie", ["spinach", "corn", "tomato sauce"]),
                Pizza::new("tuna", ["mozarella", "tuna", "onion", "tomato sauce"]),
            ],
        }
    }
}
