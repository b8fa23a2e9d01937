//! Project registry and the tool-server catalog.
//!
//! Projects are provisioned through onboarding or loaded from config
//! files at startup. The tool-server catalog keeps reusable templates
//! plus per-project instances; instance names are unique per project.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use nx_domain::config::{Project, ProjectStatus};
use nx_domain::error::{Error, Result};
use nx_domain::id::ProjectId;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Project store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ProjectStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, project: Project) {
        self.projects.write().insert(project.id.clone(), project);
    }

    /// Load a project for serving. Soft-deleted projects act as absent.
    pub fn get(&self, id: &ProjectId) -> Result<Project> {
        let projects = self.projects.read();
        let project = projects
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("project {id}")))?;
        if project.status == ProjectStatus::Deleted {
            return Err(Error::NotFound(format!("project {id}")));
        }
        Ok(project.clone())
    }

    pub fn set_status(&self, id: &ProjectId, status: ProjectStatus) -> Result<()> {
        let mut projects = self.projects.write();
        let project = projects
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("project {id}")))?;
        project.status = status;
        Ok(())
    }

    pub fn count_active(&self) -> usize {
        self.projects
            .read()
            .values()
            .filter(|p| p.status == ProjectStatus::Active)
            .count()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-server catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A reusable template describing a tool server kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Default endpoint URL; instances may override.
    pub url: String,
}

/// One project's configured tool-server instance.
#[derive(Debug, Clone, Serialize)]
pub struct McpServerInstance {
    pub id: String,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub url: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpServerCreate {
    pub name: String,
    #[serde(default)]
    pub template_id: Option<String>,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServerPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Default)]
pub struct McpServerStore {
    templates: RwLock<Vec<McpServerTemplate>>,
    instances: RwLock<HashMap<String, McpServerInstance>>,
}

impl McpServerStore {
    pub fn new() -> Self {
        let store = Self::default();
        *store.templates.write() = builtin_templates();
        store
    }

    pub fn templates(&self) -> Vec<McpServerTemplate> {
        self.templates.read().clone()
    }

    /// Create an instance. Duplicate `(project, name)` is a conflict.
    pub fn create(&self, project: &ProjectId, req: McpServerCreate) -> Result<McpServerInstance> {
        let mut instances = self.instances.write();
        if instances
            .values()
            .any(|i| &i.project_id == project && i.name == req.name)
        {
            return Err(Error::Conflict(format!(
                "tool server '{}' already exists for this project",
                req.name
            )));
        }
        let instance = McpServerInstance {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project.clone(),
            name: req.name,
            template_id: req.template_id,
            url: req.url,
            enabled: req.enabled,
            created_at: Utc::now(),
        };
        instances.insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    pub fn patch(
        &self,
        project: &ProjectId,
        id: &str,
        patch: McpServerPatch,
    ) -> Result<McpServerInstance> {
        let mut instances = self.instances.write();

        // A rename must not collide with a sibling instance.
        if let Some(new_name) = &patch.name {
            if instances
                .values()
                .any(|i| &i.project_id == project && i.id != id && &i.name == new_name)
            {
                return Err(Error::Conflict(format!(
                    "tool server '{new_name}' already exists for this project"
                )));
            }
        }

        let instance = instances
            .get_mut(id)
            .filter(|i| &i.project_id == project)
            .ok_or_else(|| Error::NotFound(format!("tool server {id}")))?;
        if let Some(name) = patch.name {
            instance.name = name;
        }
        if let Some(url) = patch.url {
            instance.url = url;
        }
        if let Some(enabled) = patch.enabled {
            instance.enabled = enabled;
        }
        Ok(instance.clone())
    }

    pub fn delete(&self, project: &ProjectId, id: &str) -> Result<()> {
        let mut instances = self.instances.write();
        match instances.get(id) {
            Some(i) if &i.project_id == project => {
                instances.remove(id);
                Ok(())
            }
            _ => Err(Error::NotFound(format!("tool server {id}"))),
        }
    }

    pub fn list(&self, project: &ProjectId) -> Vec<McpServerInstance> {
        let mut out: Vec<McpServerInstance> = self
            .instances
            .read()
            .values()
            .filter(|i| &i.project_id == project)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

fn builtin_templates() -> Vec<McpServerTemplate> {
    vec![
        McpServerTemplate {
            id: "web-search".into(),
            name: "Web Search".into(),
            description: "SERP-backed web search tools".into(),
            url: "http://localhost:7801".into(),
        },
        McpServerTemplate {
            id: "crm".into(),
            name: "CRM Connector".into(),
            description: "Contact and deal lookups against the project's CRM".into(),
            url: "http://localhost:7802".into(),
        },
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
