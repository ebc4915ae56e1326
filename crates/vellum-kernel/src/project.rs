//! Project registry: one online project and any number of offline ones.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vellum_types::{GroupId, ProjectId, ProjectKind, ProjectState, UserId, now_millis};

/// A project record. Values are snapshots; the registry owns the truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub kind: ProjectKind,
    pub state: ProjectState,
    /// Members of this group may use the project. `None` means everyone.
    pub access_group: Option<GroupId>,
    pub created_by: UserId,
    /// Unix millis.
    pub created_at: u64,
}

impl Project {
    pub fn is_online(&self) -> bool {
        self.kind == ProjectKind::Online
    }

    /// Offline and unlocked.
    pub fn accepts_changes(&self) -> bool {
        !self.is_online() && self.state.is_mutable()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectError {
    #[error("unknown project: {0}")]
    Unknown(ProjectId),
    #[error("project name already taken: {0}")]
    DuplicateName(String),
    #[error("project {0} is online; its state is fixed")]
    Online(String),
    #[error("project {0} is archived")]
    Archived(String),
}

/// Registry of projects, in creation order.
pub struct ProjectRegistry {
    online: ProjectId,
    projects: RwLock<IndexMap<ProjectId, Project>>,
}

impl ProjectRegistry {
    /// Create a registry holding only the online project.
    pub fn new(online_name: impl Into<String>) -> Self {
        let online = Project {
            id: ProjectId::new(),
            name: online_name.into(),
            kind: ProjectKind::Online,
            state: ProjectState::Unlocked,
            access_group: None,
            created_by: UserId::system(),
            created_at: now_millis(),
        };
        let id = online.id;
        let mut projects = IndexMap::new();
        projects.insert(id, online);
        Self {
            online: id,
            projects: RwLock::new(projects),
        }
    }

    pub fn online_id(&self) -> ProjectId {
        self.online
    }

    pub fn online(&self) -> Project {
        // The online project is inserted at construction and never removed.
        self.projects.read()[&self.online].clone()
    }

    pub fn get(&self, id: ProjectId) -> Result<Project, ProjectError> {
        self.projects
            .read()
            .get(&id)
            .cloned()
            .ok_or(ProjectError::Unknown(id))
    }

    pub fn by_name(&self, name: &str) -> Option<Project> {
        self.projects.read().values().find(|p| p.name == name).cloned()
    }

    pub fn list(&self) -> Vec<Project> {
        self.projects.read().values().cloned().collect()
    }

    /// Create an offline project in the unlocked state.
    pub fn create(
        &self,
        name: impl Into<String>,
        created_by: UserId,
        access_group: Option<GroupId>,
    ) -> Result<Project, ProjectError> {
        let name = name.into();
        let mut projects = self.projects.write();
        if projects.values().any(|p| p.name == name) {
            return Err(ProjectError::DuplicateName(name));
        }
        let project = Project {
            id: ProjectId::new(),
            name,
            kind: ProjectKind::Offline,
            state: ProjectState::Unlocked,
            access_group,
            created_by,
            created_at: now_millis(),
        };
        projects.insert(project.id, project.clone());
        tracing::info!(project = %project.name, id = %project.id, "project created");
        Ok(project)
    }

    /// Change the run state. `Archive` is terminal and the online project
    /// never changes state.
    pub fn set_state(&self, id: ProjectId, state: ProjectState) -> Result<Project, ProjectError> {
        let mut projects = self.projects.write();
        let project = projects.get_mut(&id).ok_or(ProjectError::Unknown(id))?;
        if project.is_online() {
            return Err(ProjectError::Online(project.name.clone()));
        }
        if !project.state.can_transition_to(state) {
            return Err(ProjectError::Archived(project.name.clone()));
        }
        if project.state != state {
            tracing::info!(project = %project.name, from = %project.state, to = %state, "project state changed");
            project.state = state;
        }
        Ok(project.clone())
    }
}
