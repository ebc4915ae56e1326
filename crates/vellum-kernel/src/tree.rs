//! Resource trees and the merged view of a project.
//!
//! The online project owns the *baseline* tree. Each offline project owns an
//! *overlay* holding only the entries that diverge from the baseline:
//! `Changed`, `New` and `Deleted` tombstones. Looking a path up in an offline
//! project checks the overlay first and falls back to the baseline, where
//! every entry is `Unchanged`.
//!
//! Both trees are `IndexMap`s keyed by normalized path, so listings come back
//! in insertion order.

use indexmap::IndexMap;
use vellum_types::path;
use vellum_types::{
    AccessFlags, ContentId, FileContent, GroupId, Resource, ResourceId, ResourceState,
    ResourceType, UserId, now_millis,
};

use crate::state::{StateEvent, TransitionError, transition};

/// One stored resource. The path is the key of the tree holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub id: ResourceId,
    pub kind: ResourceType,
    pub owner: UserId,
    pub group: GroupId,
    pub flags: AccessFlags,
    pub state: ResourceState,
    pub content: Option<FileContent>,
    pub created_at: u64,
    pub modified_at: u64,
    pub modified_by: UserId,
}

impl Entry {
    pub fn new(
        kind: ResourceType,
        owner: UserId,
        group: GroupId,
        flags: AccessFlags,
        content: Option<FileContent>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: ResourceId::new(),
            kind,
            owner,
            group,
            flags,
            state: ResourceState::New,
            content,
            created_at: now,
            modified_at: now,
            modified_by: owner,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn content_id(&self) -> Option<ContentId> {
        self.content.map(|c| c.content_id)
    }

    pub fn touch(&mut self, user: UserId) {
        self.modified_at = now_millis();
        self.modified_by = user;
    }

    pub fn to_resource(&self, path: &str, locked_by: Option<UserId>) -> Resource {
        Resource {
            id: self.id,
            path: path.to_string(),
            kind: self.kind,
            owner: self.owner,
            group: self.group,
            flags: self.flags,
            state: self.state,
            locked_by,
            content: self.content,
            created_at: self.created_at,
            modified_at: self.modified_at,
            modified_by: self.modified_by,
        }
    }
}

/// Path-keyed, insertion-ordered entries.
#[derive(Debug, Default)]
pub(crate) struct Tree {
    entries: IndexMap<String, Entry>,
}

impl Tree {
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: String, entry: Entry) -> Option<Entry> {
        self.entries.insert(path, entry)
    }

    /// Remove keeping the order of the remaining entries.
    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.shift_remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn take(&mut self) -> IndexMap<String, Entry> {
        std::mem::take(&mut self.entries)
    }

    pub fn content_ids(&self) -> impl Iterator<Item = ContentId> + '_ {
        self.entries.values().filter_map(Entry::content_id)
    }
}

/// Where a live entry was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Baseline,
    Overlay,
}

/// Result of resolving a path in a project view.
#[derive(Debug, Clone)]
pub(crate) enum Lookup {
    Live(Entry, Origin),
    /// Deleted in this project, still present in the baseline.
    Tombstone(Entry),
    Absent,
}

impl Lookup {
    pub fn state(&self) -> Option<ResourceState> {
        match self {
            Lookup::Live(e, _) | Lookup::Tombstone(e) => Some(e.state),
            Lookup::Absent => None,
        }
    }

    pub fn live(self) -> Option<(Entry, Origin)> {
        match self {
            Lookup::Live(e, o) => Some((e, o)),
            _ => None,
        }
    }
}

/// Read-only view of one project.
#[derive(Clone, Copy)]
pub(crate) struct View<'a> {
    base: &'a Tree,
    overlay: Option<&'a Tree>,
}

impl<'a> View<'a> {
    pub fn online(base: &'a Tree) -> Self {
        Self { base, overlay: None }
    }

    pub fn offline(base: &'a Tree, overlay: &'a Tree) -> Self {
        Self {
            base,
            overlay: Some(overlay),
        }
    }

    pub fn lookup(&self, path: &str) -> Lookup {
        if let Some(e) = self.overlay.and_then(|o| o.get(path)) {
            return if e.state.is_live() {
                Lookup::Live(e.clone(), Origin::Overlay)
            } else {
                Lookup::Tombstone(e.clone())
            };
        }
        match self.base.get(path) {
            Some(e) => Lookup::Live(e.clone(), Origin::Baseline),
            None => Lookup::Absent,
        }
    }

    /// Live immediate children of `folder`: baseline order first, then
    /// entries that exist only in the overlay.
    pub fn children(&self, folder: &str) -> Vec<(String, Entry)> {
        let mut out = Vec::new();
        for (p, e) in self.base.iter() {
            if path::parent(p) != Some(folder) {
                continue;
            }
            match self.overlay.and_then(|o| o.get(p)) {
                Some(o) if !o.state.is_live() => {}
                Some(o) => out.push((p.clone(), o.clone())),
                None => out.push((p.clone(), e.clone())),
            }
        }
        if let Some(overlay) = self.overlay {
            for (p, e) in overlay.iter() {
                if path::parent(p) == Some(folder)
                    && e.state.is_live()
                    && self.base.get(p).is_none()
                {
                    out.push((p.clone(), e.clone()));
                }
            }
        }
        out
    }

    pub fn has_children(&self, folder: &str) -> bool {
        let in_base = self.base.iter().any(|(p, _)| {
            path::parent(p) == Some(folder)
                && self
                    .overlay
                    .and_then(|o| o.get(p))
                    .is_none_or(|o| o.state.is_live())
        });
        in_base
            || self.overlay.is_some_and(|o| {
                o.iter()
                    .any(|(p, e)| path::parent(p) == Some(folder) && e.state.is_live())
            })
    }

    /// Overlay entries: everything publishing would apply.
    pub fn pending(&self) -> Vec<(String, Entry)> {
        self.overlay
            .map(|o| o.iter().map(|(p, e)| (p.clone(), e.clone())).collect())
            .unwrap_or_default()
    }
}

/// What [`ViewMut::remove`] did.
#[derive(Debug, Clone)]
pub(crate) struct Removal {
    /// The live entry before removal.
    pub entry: Entry,
    /// True if the entry left the project entirely (it was `New`).
    pub purged: bool,
}

/// Mutable view of an offline project. Writes only ever touch the overlay.
pub(crate) struct ViewMut<'a> {
    base: &'a Tree,
    overlay: &'a mut Tree,
}

impl<'a> ViewMut<'a> {
    pub fn new(base: &'a Tree, overlay: &'a mut Tree) -> Self {
        Self { base, overlay }
    }

    pub fn view(&self) -> View<'_> {
        View::offline(self.base, &*self.overlay)
    }

    pub fn lookup(&self, path: &str) -> Lookup {
        self.view().lookup(path)
    }

    /// Insert a new entry at `path`. With `force`, a tombstone may be
    /// overwritten.
    pub fn create(
        &mut self,
        path: &str,
        mut entry: Entry,
        force: bool,
    ) -> Result<Entry, TransitionError> {
        let current = self.lookup(path).state();
        entry.state = next_state(transition(current, StateEvent::Create, force)?)?;
        self.overlay.insert(path.to_string(), entry.clone());
        Ok(entry)
    }

    /// Apply `f` to the live entry at `path` and record it as written.
    pub fn update(
        &mut self,
        path: &str,
        f: impl FnOnce(&mut Entry),
    ) -> Result<Entry, TransitionError> {
        let (mut entry, _) = self.lookup(path).live().ok_or(TransitionError::NotFound)?;
        let state = next_state(transition(Some(entry.state), StateEvent::Write, false)?)?;
        f(&mut entry);
        entry.state = state;
        self.overlay.insert(path.to_string(), entry.clone());
        Ok(entry)
    }

    /// Delete the live entry at `path`: `New` entries are purged, anything
    /// backed by the baseline leaves a tombstone.
    pub fn remove(&mut self, path: &str) -> Result<Removal, TransitionError> {
        let (entry, _) = self.lookup(path).live().ok_or(TransitionError::NotFound)?;
        match transition(Some(entry.state), StateEvent::Delete, false)? {
            Some(state) => {
                let mut tombstone = self.base.get(path).cloned().unwrap_or_else(|| entry.clone());
                tombstone.state = state;
                self.overlay.insert(path.to_string(), tombstone);
                Ok(Removal { entry, purged: false })
            }
            None => {
                self.overlay.remove(path);
                Ok(Removal { entry, purged: true })
            }
        }
    }

    /// Move the live entry at `from` to `to`, keeping its id. Moving back
    /// onto the resource's own tombstone revives it.
    pub fn relocate(&mut self, from: &str, to: &str) -> Result<Entry, TransitionError> {
        let (entry, _) = self.lookup(from).live().ok_or(TransitionError::NotFound)?;
        let target = self.lookup(to);
        let revive = matches!(&target, Lookup::Tombstone(t) if t.id == entry.id);
        let state = next_state(transition(target.state(), StateEvent::Create, revive)?)?;

        self.remove(from)?;
        let mut moved = entry;
        moved.state = state;
        self.overlay.insert(to.to_string(), moved.clone());
        Ok(moved)
    }
}

fn next_state(next: Option<ResourceState>) -> Result<ResourceState, TransitionError> {
    next.ok_or(TransitionError::NotFound)
}

/// Outcome of applying an overlay to the baseline.
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub published: Vec<(String, ResourceId)>,
    pub removed: Vec<(String, ResourceId)>,
    /// Content no longer referenced by the baseline entry that held it.
    pub retired: Vec<ContentId>,
}

/// Why an overlay cannot be applied: the result would leave a live entry
/// without a live parent folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Conflict {
    /// A live overlay entry whose parent is gone or is not a folder.
    MissingParent { path: String, parent: String },
    /// A folder tombstone over a baseline child that would stay live.
    NotEmpty { folder: String, child: String },
}

/// Check that applying `overlay` keeps every live baseline entry under a
/// live folder. Other projects may have published since this overlay was
/// built, so its view can disagree with the current baseline.
pub(crate) fn check_overlay(base: &Tree, overlay: &Tree) -> Result<(), Conflict> {
    fn after<'t>(base: &'t Tree, overlay: &'t Tree, p: &str) -> Option<&'t Entry> {
        match overlay.get(p) {
            Some(e) if e.state.is_live() => Some(e),
            Some(_) => None,
            None => base.get(p),
        }
    }
    let live_after = |p: &str| after(base, overlay, p);

    for (p, e) in overlay.iter() {
        if e.state.is_live() {
            let Some(parent) = path::parent(p) else {
                continue;
            };
            if !live_after(parent).is_some_and(Entry::is_folder) {
                return Err(Conflict::MissingParent {
                    path: p.clone(),
                    parent: parent.to_string(),
                });
            }
        } else if let Some((child, _)) = base
            .iter()
            .find(|(c, _)| path::parent(c) == Some(p.as_str()) && live_after(c).is_some())
        {
            return Err(Conflict::NotEmpty {
                folder: p.clone(),
                child: child.clone(),
            });
        }
    }
    Ok(())
}

/// Apply `overlay` to `base` and empty the overlay. Tombstones are removed
/// first, then changed and new entries are written as `Unchanged`. On a
/// [`Conflict`] neither tree is touched.
pub(crate) fn apply_overlay(base: &mut Tree, overlay: &mut Tree) -> Result<Applied, Conflict> {
    check_overlay(base, overlay)?;
    let pending = overlay.take();
    let mut applied = Applied::default();

    for (p, e) in pending.iter().filter(|(_, e)| !e.state.is_live()) {
        if let Some(old) = base.remove(p) {
            applied.retired.extend(old.content_id());
        }
        applied.removed.push((p.clone(), e.id));
    }

    for (p, mut e) in pending.into_iter().filter(|(_, e)| e.state.is_live()) {
        e.state = transition(Some(e.state), StateEvent::Publish, false)
            .ok()
            .flatten()
            .unwrap_or(ResourceState::Unchanged);
        let id = e.id;
        let content = e.content_id();
        if let Some(old) = base.insert(p.clone(), e) {
            if old.content_id() != content {
                applied.retired.extend(old.content_id());
            }
        }
        applied.published.push((p, id));
    }
    Ok(applied)
}
