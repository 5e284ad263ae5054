//! Project secrets loading and environment credential defaults.
//!
//! Parsing failures never abort startup: every malformed-input case degrades
//! to "no suggestion, no side effects". Environment defaults are set-if-absent
//! only and never overwrite caller-provided state.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const OPENAI_API_BASE_ENV: &str = "OPENAI_API_BASE";

#[derive(Debug, Error)]
enum SecretsError {
    #[error("failed to read project secrets: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse project secrets: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
struct ProjectSecretsFile {
    #[serde(default)]
    llm: Option<LlmSecrets>,
}

/// The `llm` object of a project secrets document. Free-form tuning fields
/// (reasoning_effort, verbosity, ...) are accepted and ignored.
#[derive(Debug, Default, Deserialize)]
struct LlmSecrets {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
}

/// Load project-level secrets and seed environment defaults for
/// OpenAI-compatible backends.
///
/// Returns a suggested editor model exactly as provided in the document
/// (e.g. "gpt-5" or "openai/gpt-5") if present, otherwise `None`. The
/// suggestion is returned regardless of backend kind; the environment
/// defaults are only seeded for OpenAI-compatible kinds.
pub fn load_project_secrets(path: &Path) -> Option<String> {
    if path.as_os_str().is_empty() || !path.is_file() {
        return None;
    }

    let secrets = match parse_project_secrets(path) {
        Ok(parsed) => parsed,
        Err(error) => {
            debug!(
                "ignoring project secrets {}: {error}",
                path.display()
            );
            return None;
        }
    };

    let llm = secrets.llm.unwrap_or_default();
    let kind = llm.kind.as_deref().unwrap_or_default().to_ascii_lowercase();
    if kind.contains("openai") || kind.contains("compatible") {
        if let Some(api_key) = non_empty(llm.api_key.as_deref()) {
            set_env_if_absent(OPENAI_API_KEY_ENV, api_key);
        }
        if let Some(base_url) = non_empty(llm.base_url.as_deref()) {
            // Both common env var names for the base URL.
            set_env_if_absent(OPENAI_BASE_URL_ENV, base_url);
            set_env_if_absent(OPENAI_API_BASE_ENV, base_url);
        }
    }

    non_empty(llm.model_name.as_deref()).map(ToString::to_string)
}

fn parse_project_secrets(path: &Path) -> Result<ProjectSecretsFile, SecretsError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str::<ProjectSecretsFile>(&raw)?)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn set_env_if_absent(key: &str, value: &str) {
    let already_set = std::env::var_os(key)
        .map(|current| !current.is_empty())
        .unwrap_or(false);
    if !already_set {
        std::env::set_var(key, value);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use tempfile::tempdir;

    use super::*;

    static SECRETS_ENV_TEST_LOCK: Mutex<()> = Mutex::new(());

    const TRACKED_ENV_KEYS: [&str; 3] =
        [OPENAI_API_KEY_ENV, OPENAI_BASE_URL_ENV, OPENAI_API_BASE_ENV];

    fn snapshot_env_vars(keys: &[&str]) -> Vec<(String, Option<String>)> {
        keys.iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect()
    }

    fn restore_env_vars(snapshot: Vec<(String, Option<String>)>) {
        for (key, value) in snapshot {
            if let Some(value) = value {
                std::env::set_var(key, value);
            } else {
                std::env::remove_var(key);
            }
        }
    }

    fn clear_tracked_env_vars() {
        for key in TRACKED_ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn write_secrets(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join(".project-secrets.json");
        std::fs::write(&path, contents).expect("write secrets file");
        path
    }

    #[test]
    fn unit_missing_file_yields_no_suggestion_and_no_env_mutation() {
        let _guard = SECRETS_ENV_TEST_LOCK.lock().expect("env lock");
        let snapshot = snapshot_env_vars(&TRACKED_ENV_KEYS);
        clear_tracked_env_vars();

        let suggestion = load_project_secrets(Path::new("/nonexistent/secrets.json"));
        assert_eq!(suggestion, None);
        for key in TRACKED_ENV_KEYS {
            assert!(std::env::var(key).is_err(), "{key} must stay unset");
        }

        restore_env_vars(snapshot);
    }

    #[test]
    fn unit_empty_path_yields_no_suggestion() {
        let suggestion = load_project_secrets(Path::new(""));
        assert_eq!(suggestion, None);
    }

    #[test]
    fn unit_invalid_json_is_absorbed_without_env_mutation() {
        let _guard = SECRETS_ENV_TEST_LOCK.lock().expect("env lock");
        let snapshot = snapshot_env_vars(&TRACKED_ENV_KEYS);
        clear_tracked_env_vars();

        let temp = tempdir().expect("tempdir");
        let path = write_secrets(temp.path(), "{ not json at all");
        let suggestion = load_project_secrets(&path);
        assert_eq!(suggestion, None);
        for key in TRACKED_ENV_KEYS {
            assert!(std::env::var(key).is_err(), "{key} must stay unset");
        }

        restore_env_vars(snapshot);
    }

    #[test]
    fn unit_missing_llm_key_yields_no_suggestion_and_no_env_mutation() {
        let _guard = SECRETS_ENV_TEST_LOCK.lock().expect("env lock");
        let snapshot = snapshot_env_vars(&TRACKED_ENV_KEYS);
        clear_tracked_env_vars();

        let temp = tempdir().expect("tempdir");
        let path = write_secrets(temp.path(), r#"{"other":{"api_key":"sk-ignored"}}"#);
        let suggestion = load_project_secrets(&path);
        assert_eq!(suggestion, None);
        for key in TRACKED_ENV_KEYS {
            assert!(std::env::var(key).is_err(), "{key} must stay unset");
        }

        restore_env_vars(snapshot);
    }

    #[test]
    fn functional_openai_compatible_secrets_seed_env_defaults() {
        let _guard = SECRETS_ENV_TEST_LOCK.lock().expect("env lock");
        let snapshot = snapshot_env_vars(&TRACKED_ENV_KEYS);
        clear_tracked_env_vars();

        let temp = tempdir().expect("tempdir");
        let path = write_secrets(
            temp.path(),
            r#"{
                "llm": {
                    "type": "OpenAI-Compatible",
                    "base_url": "https://api.example.com/v1",
                    "api_key": "sk-secret",
                    "model_name": "gpt-5",
                    "reasoning_effort": "medium",
                    "verbosity": "medium"
                }
            }"#,
        );
        let suggestion = load_project_secrets(&path);
        assert_eq!(suggestion.as_deref(), Some("gpt-5"));
        assert_eq!(std::env::var(OPENAI_API_KEY_ENV).as_deref(), Ok("sk-secret"));
        assert_eq!(
            std::env::var(OPENAI_BASE_URL_ENV).as_deref(),
            Ok("https://api.example.com/v1")
        );
        assert_eq!(
            std::env::var(OPENAI_API_BASE_ENV).as_deref(),
            Ok("https://api.example.com/v1")
        );

        restore_env_vars(snapshot);
    }

    #[test]
    fn regression_secrets_never_overwrite_preexisting_env() {
        let _guard = SECRETS_ENV_TEST_LOCK.lock().expect("env lock");
        let snapshot = snapshot_env_vars(&TRACKED_ENV_KEYS);
        clear_tracked_env_vars();
        std::env::set_var(OPENAI_API_KEY_ENV, "sk-caller-provided");
        std::env::set_var(OPENAI_BASE_URL_ENV, "https://caller.example.com");

        let temp = tempdir().expect("tempdir");
        let path = write_secrets(
            temp.path(),
            r#"{"llm":{"type":"openai","api_key":"sk-from-secrets","base_url":"https://secrets.example.com"}}"#,
        );
        load_project_secrets(&path);
        assert_eq!(
            std::env::var(OPENAI_API_KEY_ENV).as_deref(),
            Ok("sk-caller-provided")
        );
        assert_eq!(
            std::env::var(OPENAI_BASE_URL_ENV).as_deref(),
            Ok("https://caller.example.com")
        );
        // The alias that was unset beforehand is still filled.
        assert_eq!(
            std::env::var(OPENAI_API_BASE_ENV).as_deref(),
            Ok("https://secrets.example.com")
        );

        restore_env_vars(snapshot);
    }

    #[test]
    fn unit_suggestion_is_returned_verbatim_for_non_openai_backend_kinds() {
        let _guard = SECRETS_ENV_TEST_LOCK.lock().expect("env lock");
        let snapshot = snapshot_env_vars(&TRACKED_ENV_KEYS);
        clear_tracked_env_vars();

        let temp = tempdir().expect("tempdir");
        let path = write_secrets(
            temp.path(),
            r#"{"llm":{"type":"Anthropic","api_key":"sk-anthropic","model_name":"openai/gpt-5"}}"#,
        );
        let suggestion = load_project_secrets(&path);
        // Verbatim, including any provider prefix already present.
        assert_eq!(suggestion.as_deref(), Some("openai/gpt-5"));
        for key in TRACKED_ENV_KEYS {
            assert!(std::env::var(key).is_err(), "{key} must stay unset");
        }

        restore_env_vars(snapshot);
    }

    #[test]
    fn functional_idempotent_reload_keeps_first_seeded_values() {
        let _guard = SECRETS_ENV_TEST_LOCK.lock().expect("env lock");
        let snapshot = snapshot_env_vars(&TRACKED_ENV_KEYS);
        clear_tracked_env_vars();

        let temp = tempdir().expect("tempdir");
        let path = write_secrets(
            temp.path(),
            r#"{"llm":{"type":"openai-compatible","api_key":"sk-first"}}"#,
        );
        load_project_secrets(&path);
        let second = write_secrets(temp.path(), r#"{"llm":{"type":"openai","api_key":"sk-second"}}"#);
        load_project_secrets(&second);
        assert_eq!(std::env::var(OPENAI_API_KEY_ENV).as_deref(), Ok("sk-first"));

        restore_env_vars(snapshot);
    }
}
