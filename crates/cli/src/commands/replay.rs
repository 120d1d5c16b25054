use std::fs;
use std::path::Path;
use std::sync::Arc;

use pizzabot_core::config::AppConfig;
use pizzabot_core::entities::EntityMap;
use pizzabot_core::flows::{ConversationEngine, ConversationRule, ConversationState};
use serde::Serialize;

use super::{offline_options, CommandResult};

#[derive(Debug, Serialize)]
struct ReplayTurn {
    line: usize,
    entities: Vec<String>,
    rule: ConversationRule,
    from: ConversationState,
    to: ConversationState,
    replies: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    command: &'static str,
    status: &'static str,
    final_state: ConversationState,
    turns: Vec<ReplayTurn>,
}

/// Runs every entity map in `file` (one JSON object per line) through a single
/// conversation. Blank lines and lines starting with `#` are skipped.
pub fn run(config_path: Option<&Path>, file: &Path) -> CommandResult {
    let config = match AppConfig::load(offline_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("replay", "config_validation", error.to_string(), 2)
        }
    };
    let catalog = match config.build_catalog() {
        Ok(catalog) => catalog,
        Err(error) => return CommandResult::failure("replay", "catalog", error.to_string(), 2),
    };

    let raw = match fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "io",
                format!("could not read `{}`: {error}", file.display()),
                1,
            )
        }
    };

    let engine = ConversationEngine::new(Arc::new(catalog), config.engine_settings());
    let mut conversation = engine.start();
    let mut turns = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entities: EntityMap = match serde_json::from_str(trimmed) {
            Ok(entities) => entities,
            Err(error) => {
                return CommandResult::failure(
                    "replay",
                    "invalid_input",
                    format!("line {line_number}: {error}"),
                    2,
                )
            }
        };

        let outcome = match engine.transition(&conversation, &entities) {
            Ok(outcome) => outcome,
            Err(error) => {
                return CommandResult::failure(
                    "replay",
                    "engine",
                    format!("line {line_number}: {error}"),
                    1,
                )
            }
        };
        if let Err(error) = conversation.apply(&outcome) {
            return CommandResult::failure(
                "replay",
                "engine",
                format!("line {line_number}: {error}"),
                1,
            );
        }

        turns.push(ReplayTurn {
            line: line_number,
            entities: entities.labels().map(str::to_string).collect(),
            rule: outcome.rule,
            from: outcome.from,
            to: outcome.to,
            replies: outcome.replies,
        });
    }

    let report =
        ReplayReport { command: "replay", status: "ok", final_state: conversation.state, turns };
    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("replay", "serialization", error.to_string(), 1),
    }
}
