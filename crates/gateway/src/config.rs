//! Gateway configuration and project config files.
//!
//! Project files are JSON, parsed strictly into typed records at the
//! boundary — the core never sees untyped maps. String values of the
//! form `${VAR_NAME}` are substituted from the process environment; a
//! missing variable fails loading with `CONFIG_ERROR`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nx_domain::config::{AgentConfig, Environment, Project, ProjectStatus};
use nx_domain::error::{Error, Result};
use nx_domain::id::ProjectId;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Directory for JSONL persistence (traces, usage). `None` keeps
    /// everything in memory (tests).
    #[serde(default = "d_data_dir")]
    pub data_dir: Option<PathBuf>,
    /// Project config files loaded at startup.
    #[serde(default)]
    pub project_files: Vec<PathBuf>,
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    4310
}
fn d_data_dir() -> Option<PathBuf> {
    Some(PathBuf::from("./data"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Project config file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The agent-config section of a project file. Carries the owning
/// project id so a copy-pasted section cannot silently attach to the
/// wrong project.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfigSection {
    pub project_id: ProjectId,
    #[serde(flatten)]
    pub config: AgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFile {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub environment: Environment,
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub agent_config: AgentConfigSection,
}

/// Substitute `${VAR}` in every string value of a JSON tree.
/// A missing variable is a `CONFIG_ERROR`.
pub fn substitute_env(value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => {
            if let Some(inner) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
                let resolved = std::env::var(inner).map_err(|_| {
                    Error::Config(format!("environment variable '{inner}' is not set"))
                })?;
                *s = resolved;
            }
            Ok(())
        }
        Value::Array(items) => items.iter_mut().try_for_each(substitute_env),
        Value::Object(map) => map.values_mut().try_for_each(substitute_env),
        _ => Ok(()),
    }
}

/// Parse a project file from raw JSON text.
pub fn parse_project_file(raw: &str) -> Result<Project> {
    let mut value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::Config(format!("project file is not valid JSON: {e}")))?;
    substitute_env(&mut value)?;

    let file: ProjectFile = serde_json::from_value(value)
        .map_err(|e| Error::Config(format!("project file shape: {e}")))?;

    if file.id != file.agent_config.project_id {
        return Err(Error::Config(format!(
            "project id '{}' does not match agent_config.project_id '{}'",
            file.id, file.agent_config.project_id
        )));
    }

    Ok(Project {
        id: file.id,
        name: file.name,
        environment: file.environment,
        owner: file.owner,
        tags: file.tags,
        config: file.agent_config.config,
        status: ProjectStatus::Active,
    })
}

/// Load and parse a project file from disk.
pub fn load_project_file(path: &Path) -> Result<Project> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_project_file(&raw)
}

/// Load the gateway config file, or defaults when `path` is `None`.
pub fn load_gateway_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        None => Ok(GatewayConfig::default()),
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
            let mut value: Value = serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("config is not valid JSON: {e}")))?;
            substitute_env(&mut value)?;
            serde_json::from_value(value)
                .map_err(|e| Error::Config(format!("config shape: {e}")))
        }
    }
}

/// Runtime variables available to `{{name}}` prompt substitution.
pub fn default_prompt_vars(project: &Project) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("project_name".into(), project.name.clone());
    vars.insert(
        "environment".into(),
        format!("{:?}", project.environment).to_lowercase(),
    );
    vars
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file_json(id: &str, cfg_project_id: &str) -> String {
        json!({
            "id": id,
            "name": "hotel-demo",
            "environment": "staging",
            "owner": "ops@example.com",
            "tags": ["hospitality"],
            "agent_config": {
                "project_id": cfg_project_id,
                "allowed_tools": ["calculator", "stay_pricing"]
            }
        })
        .to_string()
    }

    #[test]
    fn parses_valid_project_file() {
        let project = parse_project_file(&file_json("p1", "p1")).unwrap();
        assert_eq!(project.id, ProjectId::from("p1"));
        assert_eq!(project.environment, Environment::Staging);
        assert_eq!(
            project.config.allowed_tools,
            vec!["calculator", "stay_pricing"]
        );
        assert_eq!(project.status, ProjectStatus::Active);
    }

    #[test]
    fn mismatched_project_id_is_config_error() {
        let err = parse_project_file(&file_json("p1", "other")).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn env_substitution_resolves() {
        std::env::set_var("NX_TEST_OWNER_9001", "owner@example.com");
        let raw = json!({
            "id": "p1",
            "name": "demo",
            "environment": "development",
            "owner": "${NX_TEST_OWNER_9001}",
            "agent_config": { "project_id": "p1" }
        })
        .to_string();
        let project = parse_project_file(&raw).unwrap();
        assert_eq!(project.owner, "owner@example.com");
        std::env::remove_var("NX_TEST_OWNER_9001");
    }

    #[test]
    fn missing_env_var_is_config_error() {
        let raw = json!({
            "id": "p1",
            "name": "demo",
            "environment": "development",
            "owner": "${NX_TEST_DEFINITELY_MISSING_9002}",
            "agent_config": { "project_id": "p1" }
        })
        .to_string();
        let err = parse_project_file(&raw).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("NX_TEST_DEFINITELY_MISSING_9002"));
    }

    #[test]
    fn substitution_recurses_into_arrays_and_objects() {
        std::env::set_var("NX_TEST_TAG_9003", "resolved-tag");
        let mut value = json!({
            "tags": ["${NX_TEST_TAG_9003}", "plain"],
            "nested": { "inner": "${NX_TEST_TAG_9003}" }
        });
        substitute_env(&mut value).unwrap();
        assert_eq!(value["tags"][0], "resolved-tag");
        assert_eq!(value["nested"]["inner"], "resolved-tag");
        std::env::remove_var("NX_TEST_TAG_9003");
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = parse_project_file("not json{").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn gateway_config_defaults() {
        let config = load_gateway_config(None).unwrap();
        assert_eq!(config.server.port, 4310);
        assert!(config.data_dir.is_some());
    }
}
