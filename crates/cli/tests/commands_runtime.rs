use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use pizzabot_cli::commands::{config, doctor, menu, replay};
use serde_json::Value;
use tempfile::TempDir;

const BOT_TOKEN: &str = "123456:cli-secret-token";

#[test]
fn doctor_fails_without_tokens() {
    with_env(&[], || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 2, "expected readiness failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn doctor_passes_with_valid_env() {
    with_env(
        &[("PIZZABOT_TELEGRAM_BOT_TOKEN", BOT_TOKEN), ("PIZZABOT_NLU_ACCESS_TOKEN", "wit-test")],
        || {
            let result = doctor::run(None, false);
            assert_eq!(result.exit_code, 0, "expected all checks to pass: {}", result.output);
            assert!(result.output.starts_with("doctor: all readiness checks passed"));
            assert!(result.output.contains("- [ok] telegram_token_readiness: bot 123456"));
            assert!(result.output.contains("- [ok] catalog: 5 pizzas on the menu"));
            assert!(!result.output.contains("cli-secret-token"));
        },
    );
}

#[test]
fn config_attributes_sources_and_redacts_tokens() {
    with_env(
        &[("telegram_access_token", BOT_TOKEN), ("PIZZABOT_NLU_ACCESS_TOKEN", "wit-secret")],
        || {
            let output = config::run(None);

            assert!(output.contains(
                "- telegram.bot_token = 123456:*** (source: env (telegram_access_token))"
            ));
            assert!(output.contains(
                "- nlu.access_token = <redacted> (source: env (PIZZABOT_NLU_ACCESS_TOKEN))"
            ));
            assert!(output.contains("- conversation.reply_delay_ms = 700 (source: default)"));
            assert!(!output.contains("cli-secret-token"));
            assert!(!output.contains("wit-secret"));
        },
    );
}

#[test]
fn config_reports_file_values() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("pizzabot.toml");
        fs::write(
            &path,
            "[conversation]\nsession_scope = \"per_chat\"\n\n[[catalog.pizzas]]\nname = \"bianca\"\ningredients = [\"garlic\"]\n",
        )
        .expect("write config");

        let output = config::run(Some(&path));

        assert!(output.contains("- conversation.session_scope = PerChat (source: file ("));
        assert!(output.contains("- catalog.pizzas = 1 pizzas: bianca (source: file ("));
        assert!(output.contains("- telegram.bot_token = <empty> (source: default)"));
    });
}

#[test]
fn menu_lists_the_default_ingredient_menu() {
    with_env(&[], || {
        let result = menu::run(None, None);
        assert_eq!(result.exit_code, 0);

        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines[0], "Here is the menu:");
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "- margherita (mozarella, tomato sauce)");
    });
}

#[test]
fn menu_filters_by_ingredient() {
    with_env(&[], || {
        let result = menu::run(None, Some("mushrooms"));
        assert_eq!(
            result.output,
            "Here is the menu:\n- champignon (mozarella, mushrooms, onions, tomato sauce)"
        );

        let none = menu::run(None, Some("pineapple"));
        assert_eq!(none.output, "Sorry, none of our pizzas come with pineapple.");
    });
}

#[test]
fn replay_walks_a_whole_order() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("turns.jsonl");
        fs::write(
            &path,
            r#"# a complete order
{"greetings": [{"value": "true"}]}
{"intent_order": [{"value": "true"}], "pizza_type": [{"value": "tuna"}], "pizza_amount": [{"value": 3}]}
{"intent_no": [{"value": "true"}]}
{"contact": [{"value": "joe"}]}
{"city": [{"value": "munich"}]}

{"number": [{"value": 80331}]}
{"street_name": [{"value": "Marienplatz"}], "street_number": [{"value": "1"}]}
{"intent_no": [{"value": "true"}]}
{"intent_wrong": [{"value": "wrong city"}]}
"#,
        )
        .expect("write replay file");

        let result = replay::run(None, &path);
        assert_eq!(result.exit_code, 0, "replay failed: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["final_state"], "summary");
        let turns = payload["turns"].as_array().expect("turns");
        assert_eq!(turns.len(), 9);
        assert_eq!(turns[0]["line"], 2);
        assert_eq!(turns[1]["rule"], "place_order");
        assert_eq!(turns[1]["replies"][0], "- 3 tuna (mozarella, tuna, onion, tomato sauce)");
        assert_eq!(turns[5]["line"], 8);
        assert_eq!(turns[7]["to"], "correction");
        assert_eq!(turns[8]["replies"][0], "OK, we do not have time for that! (wrong city)");
    });
}

#[test]
fn replay_reports_the_offending_line() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("broken.jsonl");
        fs::write(&path, "{\"greetings\": [{\"value\": \"true\"}]}\nnot json\n")
            .expect("write replay file");

        let result = replay::run(None, &path);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_input");
        assert!(payload["message"].as_str().unwrap_or_default().starts_with("line 2:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PIZZABOT_TELEGRAM_BOT_TOKEN",
        "PIZZABOT_TELEGRAM_API_BASE_URL",
        "PIZZABOT_TELEGRAM_POLL_TIMEOUT_SECS",
        "PIZZABOT_NLU_ACCESS_TOKEN",
        "PIZZABOT_NLU_BASE_URL",
        "PIZZABOT_NLU_API_VERSION",
        "PIZZABOT_NLU_TIMEOUT_SECS",
        "PIZZABOT_CONVERSATION_REPLY_DELAY_MS",
        "PIZZABOT_CONVERSATION_DELIVERY_ETA_MINUTES",
        "PIZZABOT_CONVERSATION_DEFAULT_INGREDIENT",
        "PIZZABOT_CONVERSATION_SESSION_SCOPE",
        "PIZZABOT_SERVER_BIND_ADDRESS",
        "PIZZABOT_SERVER_HEALTH_CHECK_PORT",
        "PIZZABOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "PIZZABOT_LOGGING_LEVEL",
        "PIZZABOT_LOGGING_FORMAT",
        "PIZZABOT_LOG_LEVEL",
        "PIZZABOT_LOG_FORMAT",
        "telegram_access_token",
        "wit_access_token",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
