use std::path::Path;
use std::sync::Arc;

use pizzabot_core::config::AppConfig;
use pizzabot_core::entities::{EntityKind, EntityMap};
use pizzabot_core::flows::ConversationEngine;

use super::{offline_options, CommandResult};

/// Renders the menu reply the bot would send for "show me the menu", or for
/// "which pizzas have <ingredient>" when an ingredient is given.
pub fn run(config_path: Option<&Path>, ingredient: Option<&str>) -> CommandResult {
    let config = match AppConfig::load(offline_options(config_path)) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("menu", "config_validation", error.to_string(), 2),
    };
    let catalog = match config.build_catalog() {
        Ok(catalog) => catalog,
        Err(error) => return CommandResult::failure("menu", "catalog", error.to_string(), 2),
    };

    let engine = ConversationEngine::new(Arc::new(catalog), config.engine_settings());
    let entities = match ingredient {
        Some(ingredient) => EntityMap::new()
            .with(EntityKind::IntentIngredient, "true")
            .with(EntityKind::PizzaIngredient, ingredient),
        None => EntityMap::new().with(EntityKind::IntentMenu, "true"),
    };

    match engine.transition(&engine.start(), &entities) {
        Ok(outcome) => CommandResult { exit_code: 0, output: outcome.replies.join("\n") },
        Err(error) => CommandResult::failure("menu", "engine", error.to_string(), 1),
    }
}
