//! The resource broker.
//!
//! Every public operation takes the caller's identity and a project, then
//! runs the precondition pipeline, short-circuiting on the first failure:
//!
//! 1. project access (and, for mutations, an unlocked offline project)
//! 2. permission, evaluated against the caller's role on the resource
//! 3. lock ownership (mutations only)
//! 4. existence of the target, or absence of the destination
//!
//! Administrators skip steps 1 and 2; whether they skip step 3 is
//! configured. A resource has to be found before its permission bits can be
//! read, so a missing target surfaces as `NotFound` even though existence is
//! checked last for destinations.
//!
//! Each single-resource operation runs inside one write critical section of
//! the project overlay, and the lock check plus mutation run inside the
//! resource's lock slot. Guards are always taken baseline first, then
//! overlay, then lock slot.

mod cascade;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use vellum_types::path::{self, ROOT};
use vellum_types::{
    AccessFlags, Capability, ContentId, File, FileContent, GroupId, HeaderUpdate, ProjectId,
    ProjectState, Resource, ResourceState, ResourceType, Role, UserId, evaluate,
};

use crate::config::{BrokerConfig, LockingMode};
use crate::directory::Directory;
use crate::error::{BrokerError, BrokerResult, conflict_error, transition_error};
use crate::lock::{Lock, LockError, LockOutcome, LockTable};
use crate::project::{Project, ProjectRegistry};
use crate::state::{StateEvent, transition};
use crate::store::{ContentStore, MemoryStore};
use crate::tree::{Entry, Lookup, Tree, View, ViewMut, apply_overlay};

/// How a new file or folder should be created.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Resource type for files; defaults to plain text. Ignored for folders.
    pub kind: Option<ResourceType>,
    /// Access mask; defaults to the configured default mask.
    pub flags: Option<AccessFlags>,
    /// Group; defaults to the parent folder's group.
    pub group: Option<GroupId>,
    /// Recreate over a resource deleted in this project but still online.
    pub force: bool,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: ResourceType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// What a publish changed in the baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub project: ProjectId,
    /// Paths written to the baseline, in overlay order.
    pub published: Vec<String>,
    /// Paths removed from the baseline.
    pub removed: Vec<String>,
    /// Content payloads dropped from the store.
    pub discarded: usize,
}

impl PublishReport {
    pub fn is_empty(&self) -> bool {
        self.published.is_empty() && self.removed.is_empty()
    }
}

/// Caller context established by the project-access step.
struct Session {
    user: UserId,
    admin: bool,
    project: Project,
    overlay: Option<Arc<RwLock<Tree>>>,
}

/// Versioned resource broker.
pub struct Broker {
    config: BrokerConfig,
    projects: ProjectRegistry,
    baseline: RwLock<Tree>,
    overlays: DashMap<ProjectId, Arc<RwLock<Tree>>>,
    locks: LockTable,
    store: Arc<dyn ContentStore>,
    directory: Arc<dyn Directory>,
    /// Content ids dropped by some entry; swept by `collect_garbage`.
    retired: Mutex<Vec<ContentId>>,
}

impl Broker {
    /// Create a broker with an empty baseline holding only the root folder.
    pub fn new(
        config: BrokerConfig,
        store: Arc<dyn ContentStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        let projects = ProjectRegistry::new(config.online_project.clone());
        let mut root = Entry::new(
            ResourceType::Folder,
            UserId::system(),
            GroupId::system(),
            config.root_flags(),
            None,
        );
        root.state = ResourceState::Unchanged;
        let mut baseline = Tree::default();
        baseline.insert(ROOT.to_string(), root);

        tracing::info!(online = %config.online_project, locking = %config.locking, "broker ready");
        Self {
            config,
            projects,
            baseline: RwLock::new(baseline),
            overlays: DashMap::new(),
            locks: LockTable::new(),
            store,
            directory,
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Broker backed by a [`MemoryStore`].
    pub fn in_memory(config: BrokerConfig, directory: Arc<dyn Directory>) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()), directory)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn online_project(&self) -> ProjectId {
        self.projects.online_id()
    }

    pub fn project(&self, id: ProjectId) -> BrokerResult<Project> {
        Ok(self.projects.get(id)?)
    }

    pub fn project_by_name(&self, name: &str) -> Option<Project> {
        self.projects.by_name(name)
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects.list()
    }

    /// Locks currently held by `user`, across all projects.
    pub fn locks_held_by(&self, user: &UserId) -> Vec<Lock> {
        self.locks.held_by(*user)
    }

    // ── Project lifecycle ──────────────────────────────────────────────────

    /// Create an offline project. `access_group` limits who may use it.
    #[tracing::instrument(skip(self), name = "broker.create_project")]
    pub fn create_project(
        &self,
        user: &UserId,
        name: &str,
        access_group: Option<GroupId>,
    ) -> BrokerResult<Project> {
        let project = self.projects.create(name, *user, access_group)?;
        self.overlays.insert(project.id, Arc::default());
        Ok(project)
    }

    /// Lock, unlock or archive a project. Only its creator or an
    /// administrator may do this.
    #[tracing::instrument(skip(self), name = "broker.set_project_state")]
    pub fn set_project_state(
        &self,
        user: &UserId,
        project: ProjectId,
        state: ProjectState,
    ) -> BrokerResult<Project> {
        let current = self.projects.get(project)?;
        self.require_manager(user, &current)?;
        // Wait out in-flight writes so none lands after the state change.
        let overlay = (!current.is_online()).then(|| self.overlay(project));
        let _writes = overlay.as_ref().map(|o| o.write());
        Ok(self.projects.set_state(project, state)?)
    }

    /// Move a project to its terminal `Archive` state without publishing.
    pub fn archive(&self, user: &UserId, project: ProjectId) -> BrokerResult<Project> {
        self.set_project_state(user, project, ProjectState::Archive)
    }

    /// Apply a project's overlay to the baseline.
    ///
    /// Tombstones leave the baseline first, then changed and new resources are
    /// written as `Unchanged`. Locks on published resources are released and
    /// the overlay is emptied, so publishing twice is a no-op.
    ///
    /// An overlay that would orphan a live entry in the current baseline is
    /// refused with `MissingParent` or `NotEmpty`, and kept as it was.
    #[tracing::instrument(skip(self), name = "broker.publish")]
    pub fn publish(&self, user: &UserId, project: ProjectId) -> BrokerResult<PublishReport> {
        let project = self.projects.get(project)?;
        self.require_manager(user, &project)?;
        if project.is_online() {
            return Err(BrokerError::OnlineReadOnly(project.name));
        }
        let overlay = self.overlay(project.id);

        let applied = {
            let mut base = self.baseline.write();
            let mut pending = overlay.write();
            let current = self.projects.get(project.id)?;
            if current.state == ProjectState::Archive {
                return Err(BrokerError::ProjectLocked {
                    project: current.name,
                    state: current.state,
                });
            }
            let applied = apply_overlay(&mut base, &mut pending).map_err(|e| {
                tracing::warn!(project = %project.name, ?e, "publish conflicts with baseline");
                conflict_error(e)
            })?;
            for (_, id) in applied.published.iter().chain(&applied.removed) {
                self.locks.release(*id);
            }
            applied
        };
        self.retire(applied.retired.iter().copied());
        let discarded = self.collect_garbage()?;

        let report = PublishReport {
            project: project.id,
            published: applied.published.into_iter().map(|(p, _)| p).collect(),
            removed: applied.removed.into_iter().map(|(p, _)| p).collect(),
            discarded,
        };
        tracing::info!(
            project = %project.name,
            published = report.published.len(),
            removed = report.removed.len(),
            "project published"
        );
        Ok(report)
    }

    /// Resources of an offline project that publishing would apply, ordered
    /// by path. Always empty for the online project.
    #[tracing::instrument(skip(self), name = "broker.changed_resources")]
    pub fn changed_resources(
        &self,
        user: &UserId,
        project: ProjectId,
    ) -> BrokerResult<Vec<Resource>> {
        let s = self.session(user, project, false)?;
        let mut pending = self.read_view(&s, |view| Ok(view.pending()))?;
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pending
            .iter()
            .map(|(p, e)| self.snapshot(p, e))
            .collect())
    }

    // ── Creation ───────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, bytes), name = "broker.create_file")]
    pub fn create_file(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        bytes: &[u8],
        opts: CreateOptions,
    ) -> BrokerResult<Resource> {
        let path = path::normalize(path)?;
        let kind = opts.kind.unwrap_or(ResourceType::PlainText);
        if kind.is_folder() {
            return Err(BrokerError::invalid("use create_folder for folders"));
        }
        let s = self.session(user, project, true)?;

        let entry = self.write_view(&s, |view| {
            let parent = self.check_destination(&s, &view.view(), &path)?;
            check_absent(&view.view(), &path, opts.force)?;

            let content_id = ContentId::new();
            self.store.put_bytes(content_id, bytes)?;
            let entry = Entry::new(
                kind,
                s.user,
                opts.group.unwrap_or(parent.group),
                opts.flags.unwrap_or_else(|| self.config.default_flags()),
                Some(FileContent {
                    content_id,
                    length: bytes.len() as u64,
                }),
            );
            view.create(&path, entry, opts.force)
                .map_err(|e| transition_error(&path, e))
        })?;
        tracing::debug!(path = %path, state = %entry.state, "file created");
        Ok(self.snapshot(&path, &entry))
    }

    #[tracing::instrument(skip(self), name = "broker.create_folder")]
    pub fn create_folder(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        opts: CreateOptions,
    ) -> BrokerResult<Resource> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, true)?;

        let entry = self.write_view(&s, |view| {
            let parent = self.check_destination(&s, &view.view(), &path)?;
            check_absent(&view.view(), &path, opts.force)?;
            let entry = Entry::new(
                ResourceType::Folder,
                s.user,
                opts.group.unwrap_or(parent.group),
                opts.flags.unwrap_or_else(|| self.config.default_flags()),
                None,
            );
            view.create(&path, entry, opts.force)
                .map_err(|e| transition_error(&path, e))
        })?;
        tracing::debug!(path = %path, state = %entry.state, "folder created");
        Ok(self.snapshot(&path, &entry))
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self), name = "broker.read_file")]
    pub fn read_file(&self, user: &UserId, project: ProjectId, path: &str) -> BrokerResult<File> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, false)?;
        let (entry, bytes) = self.read_view(&s, |view| {
            let entry = file_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &entry, Capability::Read)?;
            let bytes = match entry.content_id() {
                Some(id) => self.store.get_bytes(id)?,
                None => Vec::new(),
            };
            Ok((entry, bytes))
        })?;
        Ok(File {
            resource: self.snapshot(&path, &entry),
            bytes,
        })
    }

    #[tracing::instrument(skip(self), name = "broker.read_file_header")]
    pub fn read_file_header(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
    ) -> BrokerResult<Resource> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, false)?;
        let entry = self.read_view(&s, |view| {
            let entry = file_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &entry, Capability::Read)?;
            Ok(entry)
        })?;
        Ok(self.snapshot(&path, &entry))
    }

    #[tracing::instrument(skip(self), name = "broker.read_folder")]
    pub fn read_folder(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
    ) -> BrokerResult<Resource> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, false)?;
        let entry = self.read_view(&s, |view| {
            let entry = folder_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &entry, Capability::Read)?;
            Ok(entry)
        })?;
        Ok(self.snapshot(&path, &entry))
    }

    /// Immediate subfolders the caller can see, in insertion order.
    pub fn get_sub_folders(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
    ) -> BrokerResult<Vec<Resource>> {
        self.list_children(user, project, path, true)
    }

    /// Immediate files the caller can see, in insertion order.
    pub fn get_files_in_folder(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
    ) -> BrokerResult<Vec<Resource>> {
        self.list_children(user, project, path, false)
    }

    #[tracing::instrument(skip(self), name = "broker.list")]
    fn list_children(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        folders: bool,
    ) -> BrokerResult<Vec<Resource>> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, false)?;
        self.read_view(&s, |view| {
            let folder = folder_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &folder, Capability::Read)?;
            Ok(view
                .children(&path)
                .into_iter()
                .filter(|(_, e)| e.is_folder() == folders)
                .filter(|(p, e)| self.permits(&s, p, e, Capability::Visible))
                .map(|(p, e)| self.snapshot(&p, &e))
                .collect())
        })
    }

    // ── Single-resource mutations ──────────────────────────────────────────

    /// Replace a file's content. The first write in a project copies the
    /// resource out of the baseline under a fresh content id.
    #[tracing::instrument(skip(self, bytes), name = "broker.write_file")]
    pub fn write_file(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        bytes: &[u8],
    ) -> BrokerResult<Resource> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, true)?;

        let (before, after) = self.write_view(&s, |view| {
            let current = file_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &current, Capability::Write)?;
            self.locks.with_slot(current.id, |slot| {
                self.check_lock(&s, &path, slot.holder())?;
                let content_id = ContentId::new();
                self.store.put_bytes(content_id, bytes)?;
                let updated = view
                    .update(&path, |e| {
                        e.content = Some(FileContent {
                            content_id,
                            length: bytes.len() as u64,
                        });
                        e.touch(s.user);
                    })
                    .map_err(|e| transition_error(&path, e))?;
                Ok((current, updated))
            })
        })?;
        self.retire(before.content_id());
        tracing::debug!(path = %path, state = %after.state, "file written");
        Ok(self.snapshot(&path, &after))
    }

    /// Rewrite header fields without touching content.
    #[tracing::instrument(skip(self), name = "broker.write_header")]
    pub fn write_header(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        update: HeaderUpdate,
    ) -> BrokerResult<Resource> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, true)?;
        let entry = self.mutate(&s, &path, Capability::Write, |current| {
            if let Some(kind) = update.kind.filter(|k| k.is_folder() != current.is_folder()) {
                return Err(BrokerError::invalid(format!(
                    "cannot change {path} from {} to {kind}",
                    current.kind
                )));
            }
            Ok(move |e: &mut Entry| {
                if let Some(kind) = update.kind {
                    e.kind = kind;
                }
                if let Some(flags) = update.flags {
                    e.flags = flags;
                }
            })
        })?;
        Ok(self.snapshot(&path, &entry))
    }

    /// Replace the access mask.
    pub fn chmod(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        flags: AccessFlags,
    ) -> BrokerResult<Resource> {
        self.write_header(user, project, path, HeaderUpdate::new().with_flags(flags))
    }

    /// Hand the resource to another owner. Only the owner may do this.
    #[tracing::instrument(skip(self), name = "broker.chown")]
    pub fn chown(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        new_owner: UserId,
    ) -> BrokerResult<Resource> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, true)?;
        let entry = self.mutate_as_owner(&s, &path, |e| e.owner = new_owner)?;
        Ok(self.snapshot(&path, &entry))
    }

    /// Change the resource's group. Only the owner may do this.
    #[tracing::instrument(skip(self), name = "broker.chgrp")]
    pub fn chgrp(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        new_group: GroupId,
    ) -> BrokerResult<Resource> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, true)?;
        let entry = self.mutate_as_owner(&s, &path, |e| e.group = new_group)?;
        Ok(self.snapshot(&path, &entry))
    }

    /// Rename a file within its folder. `new_name` is a bare name.
    #[tracing::instrument(skip(self), name = "broker.rename_file")]
    pub fn rename_file(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        new_name: &str,
    ) -> BrokerResult<Resource> {
        path::validate_name(new_name)?;
        let path = path::normalize(path)?;
        let folder = path::parent(&path).ok_or_else(|| BrokerError::not_a_file(ROOT))?;
        let target = path::join(folder, new_name);
        let s = self.session(user, project, true)?;

        let entry = self.write_view(&s, |view| {
            let current = file_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &current, Capability::Write)?;
            self.relocate(&s, view, &path, &target, &current)
        })?;
        tracing::debug!(from = %path, to = %target, "file renamed");
        Ok(self.snapshot(&target, &entry))
    }

    /// Move a file to another path, keeping its id (and lock).
    #[tracing::instrument(skip(self), name = "broker.move_file")]
    pub fn move_file(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
    ) -> BrokerResult<Resource> {
        let src = path::normalize(src)?;
        let dst = path::normalize(dst)?;
        let s = self.session(user, project, true)?;

        let entry = self.write_view(&s, |view| {
            let current = file_entry(view.lookup(&src), &src)?;
            self.authorize(&s, &src, &current, Capability::Read)?;
            self.authorize(&s, &src, &current, Capability::Write)?;
            self.check_destination(&s, &view.view(), &dst)?;
            self.relocate(&s, view, &src, &dst, &current)
        })?;
        tracing::debug!(from = %src, to = %dst, "file moved");
        Ok(self.snapshot(&dst, &entry))
    }

    /// Copy a file. The copy is a new resource owned by the caller; content
    /// is shared until either side is written.
    #[tracing::instrument(skip(self), name = "broker.copy_file")]
    pub fn copy_file(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
    ) -> BrokerResult<Resource> {
        let src = path::normalize(src)?;
        let dst = path::normalize(dst)?;
        let s = self.session(user, project, true)?;

        let entry = self.write_view(&s, |view| {
            let source = file_entry(view.lookup(&src), &src)?;
            self.authorize(&s, &src, &source, Capability::Read)?;
            self.check_destination(&s, &view.view(), &dst)?;
            check_absent(&view.view(), &dst, false)?;
            let copy = Entry::new(source.kind, s.user, source.group, source.flags, source.content);
            view.create(&dst, copy, false)
                .map_err(|e| transition_error(&dst, e))
        })?;
        tracing::debug!(from = %src, to = %dst, "file copied");
        Ok(self.snapshot(&dst, &entry))
    }

    /// Delete a file. Files created in this project vanish; anything that
    /// exists online leaves a tombstone until publish.
    #[tracing::instrument(skip(self), name = "broker.delete_file")]
    pub fn delete_file(&self, user: &UserId, project: ProjectId, path: &str) -> BrokerResult<()> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, true)?;

        let removed = self.write_view(&s, |view| {
            let current = file_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &current, Capability::Write)?;
            self.remove_entry(&s, view, &path, &current)
        })?;
        self.retire(removed.content_id());
        tracing::debug!(path = %path, "file deleted");
        Ok(())
    }

    // ── Locks ──────────────────────────────────────────────────────────────

    /// Lock a resource for the caller. With `force`, another user's lock is
    /// replaced.
    #[tracing::instrument(skip(self), name = "broker.lock")]
    pub fn lock(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        force: bool,
    ) -> BrokerResult<LockOutcome> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, true)?;
        if force && self.config.force_lock_requires_admin && !s.admin {
            return Err(BrokerError::access_denied(&path, Capability::Write));
        }

        let outcome = self.read_view(&s, |view| {
            let entry = live_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &entry, Capability::Write)?;
            self.locks
                .with_slot(entry.id, |slot| slot.acquire(s.user, force))
                .map_err(|e| match e {
                    LockError::AlreadyLocked { holder, .. } => BrokerError::ResourceLocked {
                        path: path.clone(),
                        holder,
                    },
                })
        })?;
        match outcome {
            LockOutcome::Stolen { previous } => {
                tracing::warn!(path = %path, user = %s.user, previous = %previous, "lock taken by force")
            }
            LockOutcome::Acquired => tracing::info!(path = %path, user = %s.user, "locked"),
            LockOutcome::AlreadyHeld => {}
        }
        Ok(outcome)
    }

    /// Release the caller's lock. Unlocking an unlocked resource is a no-op;
    /// administrators may release anyone's lock.
    #[tracing::instrument(skip(self), name = "broker.unlock")]
    pub fn unlock(&self, user: &UserId, project: ProjectId, path: &str) -> BrokerResult<()> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, false)?;
        self.read_view(&s, |view| {
            let entry = live_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &entry, Capability::Write)?;
            self.locks.with_slot(entry.id, |slot| match slot.holder() {
                Some(holder) if holder != s.user && !s.admin => Err(BrokerError::ResourceLocked {
                    path: path.clone(),
                    holder,
                }),
                Some(_) => {
                    slot.release();
                    tracing::info!(path = %path, user = %s.user, "unlocked");
                    Ok(())
                }
                None => Ok(()),
            })
        })
    }

    #[tracing::instrument(skip(self), name = "broker.locked_by")]
    pub fn locked_by(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
    ) -> BrokerResult<Option<UserId>> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, false)?;
        self.read_view(&s, |view| {
            let entry = live_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &entry, Capability::Read)?;
            Ok(self.locks.holder_of(entry.id))
        })
    }

    // ── Queries ────────────────────────────────────────────────────────────

    /// True if the resource exists and the caller can see it.
    pub fn exists(&self, user: &UserId, project: ProjectId, path: &str) -> BrokerResult<bool> {
        let path = path::normalize(path)?;
        let s = self.session(user, project, false)?;
        self.read_view(&s, |view| {
            Ok(view
                .lookup(&path)
                .live()
                .is_some_and(|(e, _)| self.permits(&s, &path, &e, Capability::Visible)))
        })
    }

    /// True if a write by the caller would pass every check right now.
    pub fn is_writeable(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
    ) -> BrokerResult<bool> {
        let path = path::normalize(path)?;
        let s = match self.session(user, project, true) {
            Ok(s) => s,
            Err(BrokerError::UnknownProject(id)) => return Err(BrokerError::UnknownProject(id)),
            Err(_) => return Ok(false),
        };
        self.read_view(&s, |view| {
            let Some((entry, _)) = view.lookup(&path).live() else {
                return Ok(false);
            };
            Ok(self.permits(&s, &path, &entry, Capability::Write)
                && self
                    .check_lock(&s, &path, self.locks.holder_of(entry.id))
                    .is_ok())
        })
    }

    /// Drop stored content no tree references anymore. Returns the number of
    /// payloads discarded.
    pub fn collect_garbage(&self) -> BrokerResult<usize> {
        let mut candidates = std::mem::take(&mut *self.retired.lock());
        if candidates.is_empty() {
            return Ok(0);
        }
        candidates.sort();
        candidates.dedup();

        let referenced: HashSet<ContentId> = {
            let base = self.baseline.read();
            let mut set: HashSet<ContentId> = base.content_ids().collect();
            let overlays: Vec<Arc<RwLock<Tree>>> =
                self.overlays.iter().map(|o| Arc::clone(o.value())).collect();
            for overlay in overlays {
                set.extend(overlay.read().content_ids());
            }
            set
        };

        let mut discarded = 0;
        for id in candidates.into_iter().filter(|id| !referenced.contains(id)) {
            self.store.discard(id)?;
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "content discarded");
        }
        Ok(discarded)
    }

    // ── Pipeline ───────────────────────────────────────────────────────────

    /// Step 1: resolve the project and check the caller may use it.
    fn session(&self, user: &UserId, project: ProjectId, mutating: bool) -> BrokerResult<Session> {
        let project = self.projects.get(project)?;
        let admin = self.directory.is_admin(user);
        if !admin && !self.may_use(user, &project) {
            tracing::debug!(user = %user, project = %project.name, "project access denied");
            return Err(BrokerError::ProjectAccessDenied {
                project: project.name,
            });
        }
        if mutating {
            if project.is_online() {
                return Err(BrokerError::OnlineReadOnly(project.name));
            }
            if !project.state.is_mutable() {
                return Err(BrokerError::ProjectLocked {
                    project: project.name,
                    state: project.state,
                });
            }
        }
        let overlay = (!project.is_online()).then(|| self.overlay(project.id));
        Ok(Session {
            user: *user,
            admin,
            project,
            overlay,
        })
    }

    fn may_use(&self, user: &UserId, project: &Project) -> bool {
        project.created_by == *user
            || project
                .access_group
                .is_none_or(|g| self.directory.is_member(user, &g))
    }

    fn require_manager(&self, user: &UserId, project: &Project) -> BrokerResult<()> {
        if project.created_by == *user || self.directory.is_admin(user) {
            Ok(())
        } else {
            Err(BrokerError::ProjectAccessDenied {
                project: project.name.clone(),
            })
        }
    }

    /// Step 2, as a yes/no answer.
    fn permits(&self, s: &Session, path: &str, entry: &Entry, capability: Capability) -> bool {
        if s.admin {
            return true;
        }
        let role = self.directory.role_of(&s.user, &entry.to_resource(path, None));
        evaluate(entry.flags, capability, role)
    }

    /// Step 2.
    fn authorize(
        &self,
        s: &Session,
        path: &str,
        entry: &Entry,
        capability: Capability,
    ) -> BrokerResult<()> {
        if self.permits(s, path, entry, capability) {
            Ok(())
        } else {
            tracing::debug!(user = %s.user, path = %path, %capability, "permission denied");
            Err(BrokerError::access_denied(path, capability))
        }
    }

    /// Step 3 for the resource being changed.
    fn check_lock(&self, s: &Session, path: &str, holder: Option<UserId>) -> BrokerResult<()> {
        if s.admin && self.config.admin_bypasses_lock {
            return Ok(());
        }
        match holder {
            Some(h) if h == s.user => Ok(()),
            Some(h) => Err(BrokerError::ResourceLocked {
                path: path.to_string(),
                holder: h,
            }),
            None if self.config.locking == LockingMode::Strict => {
                Err(BrokerError::LockRequired(path.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Step 3 for a folder receiving a new child: only another user's lock
    /// gets in the way.
    fn check_folder_lock(&self, s: &Session, path: &str, holder: Option<UserId>) -> BrokerResult<()> {
        match holder {
            Some(h) if h != s.user && !(s.admin && self.config.admin_bypasses_lock) => {
                Err(BrokerError::ResourceLocked {
                    path: path.to_string(),
                    holder: h,
                })
            }
            _ => Ok(()),
        }
    }

    /// Checks on the parent folder of a new or moved-in resource. Returns the
    /// parent entry.
    fn check_destination(&self, s: &Session, view: &View<'_>, dst: &str) -> BrokerResult<Entry> {
        let parent_path = path::parent(dst).ok_or_else(|| BrokerError::already_exists(ROOT))?;
        let parent = folder_entry(view.lookup(parent_path), parent_path)?;
        self.authorize(s, parent_path, &parent, Capability::Write)?;
        self.check_folder_lock(s, parent_path, self.locks.holder_of(parent.id))?;
        Ok(parent)
    }

    /// Header-style mutation: permission, lock, then a `Write` transition.
    /// `prepare` validates the current entry and returns the change to apply.
    fn mutate<F, G>(
        &self,
        s: &Session,
        path: &str,
        capability: Capability,
        prepare: F,
    ) -> BrokerResult<Entry>
    where
        F: FnOnce(&Entry) -> BrokerResult<G>,
        G: FnOnce(&mut Entry),
    {
        self.write_view(s, |view| {
            let current = live_entry(view.lookup(path), path)?;
            self.authorize(s, path, &current, capability)?;
            let change = prepare(&current)?;
            self.locks.with_slot(current.id, |slot| {
                self.check_lock(s, path, slot.holder())?;
                view.update(path, |e| {
                    change(e);
                    e.touch(s.user);
                })
                .map_err(|e| transition_error(path, e))
            })
        })
    }

    /// chown/chgrp: the caller must own the resource.
    fn mutate_as_owner(
        &self,
        s: &Session,
        path: &str,
        change: impl FnOnce(&mut Entry),
    ) -> BrokerResult<Entry> {
        self.write_view(s, |view| {
            let current = live_entry(view.lookup(path), path)?;
            let role = self.directory.role_of(&s.user, &current.to_resource(path, None));
            if !s.admin && role != Role::Owner {
                return Err(BrokerError::access_denied(path, Capability::Write));
            }
            self.locks.with_slot(current.id, |slot| {
                self.check_lock(s, path, slot.holder())?;
                view.update(path, |e| {
                    change(e);
                    e.touch(s.user);
                })
                .map_err(|e| transition_error(path, e))
            })
        })
    }

    /// Lock check plus move, inside the resource's lock slot.
    fn relocate(
        &self,
        s: &Session,
        view: &mut ViewMut<'_>,
        from: &str,
        to: &str,
        current: &Entry,
    ) -> BrokerResult<Entry> {
        if from == to {
            return Err(BrokerError::already_exists(to));
        }
        self.locks.with_slot(current.id, |slot| {
            self.check_lock(s, from, slot.holder())?;
            view.relocate(from, to).map_err(|e| transition_error(to, e))
        })
    }

    /// Lock check plus delete, inside the resource's lock slot. Returns the
    /// removed entry.
    fn remove_entry(
        &self,
        s: &Session,
        view: &mut ViewMut<'_>,
        path: &str,
        current: &Entry,
    ) -> BrokerResult<Entry> {
        self.locks.with_slot(current.id, |slot| {
            self.check_lock(s, path, slot.holder())?;
            let removal = view.remove(path).map_err(|e| transition_error(path, e))?;
            if removal.purged {
                slot.release();
            }
            Ok(removal.entry)
        })
    }

    // ── Guards ─────────────────────────────────────────────────────────────

    fn overlay(&self, project: ProjectId) -> Arc<RwLock<Tree>> {
        Arc::clone(&self.overlays.entry(project).or_default())
    }

    fn read_view<R>(
        &self,
        s: &Session,
        f: impl FnOnce(View<'_>) -> BrokerResult<R>,
    ) -> BrokerResult<R> {
        let base = self.baseline.read();
        match &s.overlay {
            Some(overlay) => {
                let overlay = overlay.read();
                f(View::offline(&base, &overlay))
            }
            None => f(View::online(&base)),
        }
    }

    fn write_view<R>(
        &self,
        s: &Session,
        f: impl FnOnce(&mut ViewMut<'_>) -> BrokerResult<R>,
    ) -> BrokerResult<R> {
        let overlay = s
            .overlay
            .as_ref()
            .ok_or_else(|| BrokerError::OnlineReadOnly(s.project.name.clone()))?;
        let base = self.baseline.read();
        let mut overlay = overlay.write();
        let project = self.projects.get(s.project.id)?;
        if !project.state.is_mutable() {
            return Err(BrokerError::ProjectLocked {
                project: project.name,
                state: project.state,
            });
        }
        let mut view = ViewMut::new(&base, &mut overlay);
        f(&mut view)
    }

    /// Record a resource snapshot. Must not run inside a lock slot.
    fn snapshot(&self, path: &str, entry: &Entry) -> Resource {
        entry.to_resource(path, self.locks.holder_of(entry.id))
    }

    fn retire(&self, ids: impl IntoIterator<Item = ContentId>) {
        self.retired.lock().extend(ids);
    }
}

fn live_entry(lookup: Lookup, path: &str) -> BrokerResult<Entry> {
    lookup
        .live()
        .map(|(e, _)| e)
        .ok_or_else(|| BrokerError::not_found(path))
}

fn folder_entry(lookup: Lookup, path: &str) -> BrokerResult<Entry> {
    let entry = live_entry(lookup, path)?;
    if entry.is_folder() {
        Ok(entry)
    } else {
        Err(BrokerError::not_a_folder(path))
    }
}

fn file_entry(lookup: Lookup, path: &str) -> BrokerResult<Entry> {
    let entry = live_entry(lookup, path)?;
    if entry.is_folder() {
        Err(BrokerError::not_a_file(path))
    } else {
        Ok(entry)
    }
}

/// Step 4 for a destination: nothing live there, and no tombstone unless
/// `force` is set.
fn check_absent(view: &View<'_>, dst: &str, force: bool) -> BrokerResult<()> {
    transition(view.lookup(dst).state(), StateEvent::Create, force)
        .map(|_| ())
        .map_err(|e| transition_error(dst, e))
}
