use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::domain::pizza::Pizza;
use crate::errors::DomainError;

pub const EMPTY_ORDER_LINE: &str = "No order was placed.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub pizza: Pizza,
    pub quantity: u32,
}

/// Quantities for every catalog pizza, kept in catalog order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    lines: Vec<OrderLine>,
}

impl Order {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            lines: catalog
                .iter()
                .map(|pizza| OrderLine { pizza: pizza.clone(), quantity: 0 })
                .collect(),
        }
    }

    pub fn add_pizza(&mut self, name: &str, amount: u32) -> Result<(), DomainError> {
        let line = self
            .lines
            .iter_mut()
            .find(|line| line.pizza.name == name)
            .ok_or_else(|| DomainError::UnknownPizza { name: name.to_owned() })?;
        line.quantity = line.quantity.saturating_add(amount);
        Ok(())
    }

    pub fn quantity(&self, name: &str) -> Option<u32> {
        self.lines.iter().find(|line| line.pizza.name == name).map(|line| line.quantity)
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.quantity == 0)
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.quantity = 0;
        }
    }

    pub fn render(&self) -> Vec<String> {
        let rendered = self
            .lines
            .iter()
            .filter(|line| line.quantity > 0)
            .map(|line| format!("{} {}", line.quantity, line.pizza))
            .collect::<Vec<_>>();

        if rendered.is_empty() {
            vec![EMPTY_ORDER_LINE.to_owned()]
        } else {
            rendered
        }
    }

    /// Chat form of [`Order::render`]: bulleted lines joined into one message.
    pub fn summary_text(&self) -> String {
        if self.is_empty() {
            return EMPTY_ORDER_LINE.to_owned();
        }
        self.render().iter().map(|line| format!("- {line}")).collect::<Vec<_>>().join("\n")
    }
}
