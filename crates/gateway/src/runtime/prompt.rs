//! Prompt layers and system-prompt assembly.
//!
//! Each project keeps versioned layers of three types (identity,
//! instructions, safety) with at most one active version per type.
//! Activation is an atomic flip inside one write lock: a concurrent
//! reader sees either the old version or the new one, never two actives
//! nor none.
//!
//! The resolver assembles five labeled sections in a fixed order and
//! produces a [`PromptSnapshot`] that pins the assembled prompt for
//! audit: layer ids + versions plus SHA-256 of the two
//! runtime-synthesized sections.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use nx_domain::error::{Error, Result};
use nx_domain::id::{ProjectId, PromptLayerId};
use nx_domain::message::ToolDefinition;
use nx_domain::trace::{LayerRef, PromptSnapshot};
use nx_memory::MemoryHit;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Identity,
    Instructions,
    Safety,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptLayer {
    pub id: PromptLayerId,
    pub project_id: ProjectId,
    pub layer_type: LayerType,
    /// Monotonic per (project, layer_type).
    pub version: u32,
    pub content: String,
    pub is_active: bool,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The assembled prompt plus its audit snapshot.
#[derive(Debug, Clone)]
pub struct ResolvedPrompt {
    pub system_prompt: String,
    pub snapshot: PromptSnapshot,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Layer store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct PromptLayerStore {
    layers: RwLock<Vec<PromptLayer>>,
}

impl PromptLayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new (inactive) version. The version number is the next
    /// monotonic value for (project, layer_type).
    pub fn add_version(
        &self,
        project: &ProjectId,
        layer_type: LayerType,
        content: impl Into<String>,
        created_by: impl Into<String>,
        change_reason: Option<String>,
    ) -> PromptLayer {
        let mut layers = self.layers.write();
        let version = layers
            .iter()
            .filter(|l| &l.project_id == project && l.layer_type == layer_type)
            .map(|l| l.version)
            .max()
            .unwrap_or(0)
            + 1;
        let layer = PromptLayer {
            id: PromptLayerId::new(),
            project_id: project.clone(),
            layer_type,
            version,
            content: content.into(),
            is_active: false,
            created_by: created_by.into(),
            change_reason,
            created_at: Utc::now(),
        };
        layers.push(layer.clone());
        layer
    }

    /// Activate a layer version, atomically deactivating the previous
    /// active version of the same (project, layer_type).
    pub fn activate(&self, layer_id: &PromptLayerId) -> Result<()> {
        let mut layers = self.layers.write();
        let (project, layer_type) = layers
            .iter()
            .find(|l| &l.id == layer_id)
            .map(|l| (l.project_id.clone(), l.layer_type))
            .ok_or_else(|| Error::NotFound(format!("prompt layer {layer_id}")))?;

        for layer in layers.iter_mut() {
            if layer.project_id == project && layer.layer_type == layer_type {
                layer.is_active = &layer.id == layer_id;
            }
        }
        Ok(())
    }

    /// Convenience for provisioning: add + activate in one step.
    pub fn add_active(
        &self,
        project: &ProjectId,
        layer_type: LayerType,
        content: impl Into<String>,
        created_by: impl Into<String>,
    ) -> PromptLayer {
        let layer = self.add_version(project, layer_type, content, created_by, None);
        self.activate(&layer.id).expect("layer just inserted");
        // Reflect the flip in the returned copy.
        PromptLayer {
            is_active: true,
            ..layer
        }
    }

    /// The active layer for (project, layer_type), if any.
    pub fn active(&self, project: &ProjectId, layer_type: LayerType) -> Option<PromptLayer> {
        self.layers
            .read()
            .iter()
            .find(|l| &l.project_id == project && l.layer_type == layer_type && l.is_active)
            .cloned()
    }

    pub fn versions(&self, project: &ProjectId, layer_type: LayerType) -> Vec<PromptLayer> {
        let mut out: Vec<PromptLayer> = self
            .layers
            .read()
            .iter()
            .filter(|l| &l.project_id == project && l.layer_type == layer_type)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.version);
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Variable substitution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Substitute `{{name}}` placeholders from the variable map. Unknown
/// names pass through unchanged so layers stay debuggable.
pub fn substitute_vars(content: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(&after[..end]);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn render_tools_section(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return "No tools are available for this conversation.".into();
    }
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_context_section(memories: &[MemoryHit]) -> String {
    if memories.is_empty() {
        return "No additional context was retrieved.".into();
    }
    memories
        .iter()
        .map(|hit| format!("- [{}] {}", hit.entry.category, hit.entry.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the system prompt for one run.
///
/// Fails with `PROMPT_NOT_CONFIGURED` unless all three layer types have
/// an active version. Section order is fixed: Identity, Instructions,
/// Available Tools, Relevant Context, Safety & Boundaries.
pub fn resolve_prompt(
    store: &PromptLayerStore,
    project: &ProjectId,
    tools: &[ToolDefinition],
    memories: &[MemoryHit],
    vars: &HashMap<String, String>,
) -> Result<ResolvedPrompt> {
    let load = |layer_type: LayerType, name: &str| {
        store
            .active(project, layer_type)
            .ok_or_else(|| Error::PromptNotConfigured(format!("no active {name} layer")))
    };
    let identity = load(LayerType::Identity, "identity")?;
    let instructions = load(LayerType::Instructions, "instructions")?;
    let safety = load(LayerType::Safety, "safety")?;

    let tools_section = render_tools_section(tools);
    let context_section = render_context_section(memories);

    let system_prompt = format!(
        "# Identity\n{}\n\n# Instructions\n{}\n\n# Available Tools\n{}\n\n# Relevant Context\n{}\n\n# Safety & Boundaries\n{}",
        substitute_vars(&identity.content, vars),
        substitute_vars(&instructions.content, vars),
        tools_section,
        context_section,
        substitute_vars(&safety.content, vars),
    );

    let layer_ref = |l: &PromptLayer| LayerRef {
        layer_id: l.id.clone(),
        version: l.version,
    };

    Ok(ResolvedPrompt {
        system_prompt,
        snapshot: PromptSnapshot {
            identity: layer_ref(&identity),
            instructions: layer_ref(&instructions),
            safety: layer_ref(&safety),
            tools_sha256: sha256_hex(&tools_section),
            context_sha256: sha256_hex(&context_section),
        },
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use nx_memory::{MemoryEntry, MemoryHit};

    fn project() -> ProjectId {
        ProjectId::from("p1")
    }

    fn seeded_store() -> PromptLayerStore {
        let store = PromptLayerStore::new();
        store.add_active(&project(), LayerType::Identity, "You are {{agent_name}}.", "test");
        store.add_active(&project(), LayerType::Instructions, "Answer briefly.", "test");
        store.add_active(&project(), LayerType::Safety, "Refuse harmful requests.", "test");
        store
    }

    fn hit(category: &str, content: &str) -> MemoryHit {
        MemoryHit {
            entry: MemoryEntry::new(project(), category, content, vec![1.0], 0.9),
            similarity: 0.9,
            effective_importance: 0.9,
        }
    }

    #[test]
    fn versions_are_monotonic_per_type() {
        let store = PromptLayerStore::new();
        let v1 = store.add_version(&project(), LayerType::Identity, "a", "t", None);
        let v2 = store.add_version(&project(), LayerType::Identity, "b", "t", None);
        let other = store.add_version(&project(), LayerType::Safety, "c", "t", None);
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(other.version, 1);
    }

    #[test]
    fn activate_flips_atomically() {
        let store = PromptLayerStore::new();
        let v1 = store.add_version(&project(), LayerType::Identity, "a", "t", None);
        let v2 = store.add_version(&project(), LayerType::Identity, "b", "t", None);

        store.activate(&v1.id).unwrap();
        assert_eq!(store.active(&project(), LayerType::Identity).unwrap().id, v1.id);

        store.activate(&v2.id).unwrap();
        let active = store.active(&project(), LayerType::Identity).unwrap();
        assert_eq!(active.id, v2.id);

        // Exactly one active version exists.
        let actives = store
            .versions(&project(), LayerType::Identity)
            .into_iter()
            .filter(|l| l.is_active)
            .count();
        assert_eq!(actives, 1);
    }

    #[test]
    fn activate_unknown_layer_is_not_found() {
        let store = PromptLayerStore::new();
        let err = store.activate(&PromptLayerId::from("ghost")).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn substitution_replaces_known_and_passes_unknown() {
        let mut vars = HashMap::new();
        vars.insert("agent_name".to_string(), "Iris".to_string());
        let out = substitute_vars("I am {{agent_name}}, model {{model}}.", &vars);
        assert_eq!(out, "I am Iris, model {{model}}.");
    }

    #[test]
    fn substitution_handles_unterminated_braces() {
        let vars = HashMap::new();
        assert_eq!(substitute_vars("broken {{name", &vars), "broken {{name");
    }

    #[test]
    fn resolve_fails_without_all_three_layers() {
        let store = PromptLayerStore::new();
        store.add_active(&project(), LayerType::Identity, "x", "t");
        store.add_active(&project(), LayerType::Instructions, "y", "t");
        // No safety layer.
        let err =
            resolve_prompt(&store, &project(), &[], &[], &HashMap::new()).unwrap_err();
        assert_eq!(err.code(), "PROMPT_NOT_CONFIGURED");
    }

    #[test]
    fn sections_appear_in_order() {
        let store = seeded_store();
        let mut vars = HashMap::new();
        vars.insert("agent_name".to_string(), "Iris".to_string());
        let resolved = resolve_prompt(&store, &project(), &[], &[], &vars).unwrap();
        let p = &resolved.system_prompt;

        let idx = |needle: &str| p.find(needle).unwrap_or_else(|| panic!("missing {needle}"));
        assert!(idx("# Identity") < idx("# Instructions"));
        assert!(idx("# Instructions") < idx("# Available Tools"));
        assert!(idx("# Available Tools") < idx("# Relevant Context"));
        assert!(idx("# Relevant Context") < idx("# Safety & Boundaries"));
        assert!(p.contains("You are Iris."));
    }

    #[test]
    fn snapshot_is_deterministic_for_same_inputs() {
        let store = seeded_store();
        let tools = vec![ToolDefinition {
            name: "calculator".into(),
            description: "math".into(),
            parameters: serde_json::json!({}),
        }];
        let memories = vec![hit("facts", "check-in is at 14:00")];
        let vars = HashMap::new();

        let a = resolve_prompt(&store, &project(), &tools, &memories, &vars).unwrap();
        let b = resolve_prompt(&store, &project(), &tools, &memories, &vars).unwrap();
        assert_eq!(a.snapshot, b.snapshot);
        assert_eq!(a.system_prompt, b.system_prompt);
    }

    #[test]
    fn snapshot_digests_track_section_content() {
        let store = seeded_store();
        let vars = HashMap::new();
        let empty = resolve_prompt(&store, &project(), &[], &[], &vars).unwrap();
        let with_memory = resolve_prompt(
            &store,
            &project(),
            &[],
            &[hit("facts", "pool closes at 20:00")],
            &vars,
        )
        .unwrap();
        assert_eq!(empty.snapshot.tools_sha256, with_memory.snapshot.tools_sha256);
        assert_ne!(
            empty.snapshot.context_sha256,
            with_memory.snapshot.context_sha256
        );
    }

    #[test]
    fn new_version_changes_snapshot_layer_ref() {
        let store = seeded_store();
        let vars = HashMap::new();
        let before = resolve_prompt(&store, &project(), &[], &[], &vars).unwrap();

        let v2 = store.add_version(&project(), LayerType::Instructions, "Be thorough.", "t", None);
        store.activate(&v2.id).unwrap();
        let after = resolve_prompt(&store, &project(), &[], &[], &vars).unwrap();

        assert_ne!(before.snapshot.instructions, after.snapshot.instructions);
        assert_eq!(after.snapshot.instructions.version, 2);
    }
}
