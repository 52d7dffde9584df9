use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            &env_key(field.key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let field = |key: &'static str, value: String| Field { key, value };
    vec![
        field("database.url", config.database.url.clone()),
        field("database.max_connections", config.database.max_connections.to_string()),
        field("database.timeout_secs", config.database.timeout_secs.to_string()),
        field("llm.provider", format!("{:?}", config.llm.provider)),
        field("llm.model", config.llm.model.clone()),
        field("llm.base_url", config.llm.base_url.clone().unwrap_or_else(|| "<unset>".into())),
        field("llm.endpoint", config.llm.endpoint()),
        field(
            "llm.api_key",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        ),
        field("llm.timeout_secs", config.llm.timeout_secs.to_string()),
        field("llm.max_retries", config.llm.max_retries.to_string()),
        field("server.bind_address", config.server.bind_address.clone()),
        field("server.port", config.server.port.to_string()),
        field("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        field("negotiation.player_id", config.negotiation.player_id.clone()),
        field("negotiation.npc_id", config.negotiation.npc_id.clone()),
        field("negotiation.history_window", config.negotiation.history_window.to_string()),
        field("negotiation.max_unsure_rounds", config.negotiation.max_unsure_rounds.to_string()),
        field("negotiation.vague_quantity", config.negotiation.vague_quantity.as_str().into()),
        field("logging.level", config.logging.level.clone()),
        field("logging.format", format!("{:?}", config.logging.format)),
    ]
}

/// `llm.max_retries` -> `PARLEY_LLM_MAX_RETRIES`.
fn env_key(key_path: &str) -> String {
    format!("PARLEY_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    ["parley.toml", "config/parley.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use parley_core::config::AppConfig;
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, effective_fields, env_key, field_source};

    #[test]
    fn env_keys_follow_the_section_layout() {
        assert_eq!(env_key("llm.max_retries"), "PARLEY_LLM_MAX_RETRIES");
        assert_eq!(env_key("negotiation.npc_id"), "PARLEY_NEGOTIATION_NPC_ID");
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        let doc: Value = "[negotiation]\nnpc_id = \"7\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "negotiation.npc_id"));
        assert!(!contains_path(&doc, "negotiation.player_id"));
        assert_eq!(
            field_source(
                "negotiation.npc_id",
                "PARLEY_TEST_UNSET_KEY",
                Some(&doc),
                Some(Path::new("parley.toml"))
            ),
            "file (parley.toml)"
        );
        assert_eq!(
            field_source("negotiation.player_id", "PARLEY_TEST_UNSET_KEY", Some(&doc), None),
            "default"
        );
    }

    #[test]
    fn api_key_is_never_printed() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some(SecretString::from("sk-live-secret".to_string()));

        let fields = effective_fields(&config);
        let api_key = fields.iter().find(|field| field.key == "llm.api_key").expect("api key");

        assert_eq!(api_key.value, "<redacted>");
        assert!(fields.iter().all(|field| !field.value.contains("sk-live-secret")));
    }
}
