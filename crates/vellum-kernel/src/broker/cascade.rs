//! Recursive folder operations.
//!
//! Non-forced calls only succeed on empty folders. Forced calls walk the
//! subtree (files first, then subfolders, depth first) and run every child
//! through the full single-resource pipeline, each in its own critical
//! section. The walk is **not atomic**: the first child failure stops it,
//! children already handled stay handled, and the error is
//! `PartialFailure`, even when `completed` is empty, since a folder move
//! may already have created its destination node. Paths in `failed` and
//! `completed` always name the source tree.
//!
//! A folder with no children is handled in a single step, and its failures
//! come back as plain errors.

use vellum_types::path;
use vellum_types::{Capability, ProjectId, Resource, UserId};

use super::{Broker, Session, check_absent, folder_entry};
use crate::error::{BrokerError, BrokerResult, transition_error};
use crate::tree::{Entry, Lookup, View};

/// First failure of a walk: the path being handled and why it failed.
type Halt = (String, BrokerError);

impl Broker {
    /// Delete a folder. Without `force` the folder must be empty.
    ///
    /// Returns the deleted paths in the order they were deleted.
    #[tracing::instrument(skip(self), name = "broker.delete_folder")]
    pub fn delete_folder(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        force: bool,
    ) -> BrokerResult<Vec<String>> {
        let path = path::normalize(path)?;
        if path::is_root(&path) {
            return Err(BrokerError::invalid("the root folder cannot be deleted"));
        }
        let s = self.session(user, project, true)?;
        let has_children = self.read_view(&s, |view| {
            let folder = folder_entry(view.lookup(&path), &path)?;
            self.authorize(&s, &path, &folder, Capability::Write)?;
            self.check_lock(&s, &path, self.locks.holder_of(folder.id))?;
            Ok(view.has_children(&path))
        })?;
        if !has_children {
            self.delete_empty_folder(user, project, &path)?;
            tracing::info!(path = %path, "folder deleted");
            return Ok(vec![path]);
        }
        if !force {
            return Err(BrokerError::not_empty(path));
        }

        let mut completed = Vec::new();
        self.delete_tree(user, project, &path, &mut completed)
            .map_err(|h| partial_failure(h, &completed))?;
        tracing::info!(path = %path, count = completed.len(), "folder deleted");
        Ok(completed)
    }

    /// Copy a folder to `dst`. Without `force` the folder must be empty.
    ///
    /// Returns the copied source paths.
    #[tracing::instrument(skip(self), name = "broker.copy_folder")]
    pub fn copy_folder(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
        force: bool,
    ) -> BrokerResult<Vec<String>> {
        let src = path::normalize(src)?;
        let dst = path::normalize(dst)?;
        if path::is_within(&dst, &src) {
            return Err(BrokerError::invalid(format!("cannot copy {src} into itself")));
        }
        let s = self.session(user, project, true)?;
        let has_children = self.read_view(&s, |view| {
            let folder = folder_entry(view.lookup(&src), &src)?;
            self.authorize(&s, &src, &folder, Capability::Read)?;
            self.check_destination(&s, &view, &dst)?;
            check_absent(&view, &dst, false)?;
            Ok(view.has_children(&src))
        })?;
        if !has_children {
            self.copy_folder_node(user, project, &src, &dst)?;
            tracing::info!(from = %src, to = %dst, "folder copied");
            return Ok(vec![src]);
        }
        if !force {
            return Err(BrokerError::not_empty(src));
        }

        let mut completed = Vec::new();
        self.copy_tree(user, project, &src, &dst, &mut completed)
            .map_err(|h| partial_failure(h, &completed))?;
        tracing::info!(from = %src, to = %dst, count = completed.len(), "folder copied");
        Ok(completed)
    }

    /// Move a folder to `dst`, keeping the ids of everything moved. Without
    /// `force` the folder must be empty.
    ///
    /// Returns the moved source paths.
    #[tracing::instrument(skip(self), name = "broker.move_folder")]
    pub fn move_folder(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
        force: bool,
    ) -> BrokerResult<Vec<String>> {
        let src = path::normalize(src)?;
        let dst = path::normalize(dst)?;
        if path::is_root(&src) {
            return Err(BrokerError::invalid("the root folder cannot be moved"));
        }
        if path::is_within(&dst, &src) {
            return Err(BrokerError::invalid(format!("cannot move {src} into itself")));
        }
        let s = self.session(user, project, true)?;
        let has_children = self.read_view(&s, |view| {
            let folder = folder_entry(view.lookup(&src), &src)?;
            self.authorize(&s, &src, &folder, Capability::Read)?;
            self.authorize(&s, &src, &folder, Capability::Write)?;
            self.check_lock(&s, &src, self.locks.holder_of(folder.id))?;
            self.check_destination(&s, &view, &dst)?;
            check_absent(&view, &dst, revives(&view, &dst, &folder))?;
            Ok(view.has_children(&src))
        })?;
        if !has_children {
            self.move_empty_folder(user, project, &src, &dst)?;
            tracing::info!(from = %src, to = %dst, "folder moved");
            return Ok(vec![src]);
        }
        if !force {
            return Err(BrokerError::not_empty(src));
        }

        let mut completed = Vec::new();
        self.move_tree(user, project, &src, &dst, &mut completed)
            .map_err(|h| partial_failure(h, &completed))?;
        tracing::info!(from = %src, to = %dst, count = completed.len(), "folder moved");
        Ok(completed)
    }

    /// Rename a folder within its parent; a move to a sibling path.
    pub fn rename_folder(
        &self,
        user: &UserId,
        project: ProjectId,
        path: &str,
        new_name: &str,
        force: bool,
    ) -> BrokerResult<Vec<String>> {
        path::validate_name(new_name)?;
        let path = path::normalize(path)?;
        let parent = path::parent(&path)
            .ok_or_else(|| BrokerError::invalid("the root folder cannot be renamed"))?;
        let target = path::join(parent, new_name);
        self.move_folder(user, project, &path, &target, force)
    }

    // ── Walks ──────────────────────────────────────────────────────────────

    fn delete_tree(
        &self,
        user: &UserId,
        project: ProjectId,
        folder: &str,
        completed: &mut Vec<String>,
    ) -> Result<(), Halt> {
        let (files, folders) = self.child_paths(user, project, folder).map_err(halt(folder))?;
        for file in files {
            self.delete_file(user, project, &file).map_err(halt(&file))?;
            completed.push(file);
        }
        for sub in folders {
            self.delete_tree(user, project, &sub, completed)?;
        }
        self.delete_empty_folder(user, project, folder).map_err(halt(folder))?;
        completed.push(folder.to_string());
        Ok(())
    }

    fn copy_tree(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
        completed: &mut Vec<String>,
    ) -> Result<(), Halt> {
        self.copy_folder_node(user, project, src, dst).map_err(halt(src))?;
        completed.push(src.to_string());

        let (files, folders) = self.child_paths(user, project, src).map_err(halt(src))?;
        for file in files {
            let target = rebased(&file, src, dst);
            self.copy_file(user, project, &file, &target).map_err(halt(&file))?;
            completed.push(file);
        }
        for sub in folders {
            let target = rebased(&sub, src, dst);
            self.copy_tree(user, project, &sub, &target, completed)?;
        }
        Ok(())
    }

    fn move_tree(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
        completed: &mut Vec<String>,
    ) -> Result<(), Halt> {
        let (files, folders) = self.child_paths(user, project, src).map_err(halt(src))?;
        if files.is_empty() && folders.is_empty() {
            self.move_empty_folder(user, project, src, dst).map_err(halt(src))?;
            completed.push(src.to_string());
            return Ok(());
        }

        self.open_folder_move(user, project, src, dst).map_err(halt(src))?;
        for file in files {
            let target = rebased(&file, src, dst);
            self.move_file(user, project, &file, &target).map_err(halt(&file))?;
            completed.push(file);
        }
        for sub in folders {
            let target = rebased(&sub, src, dst);
            self.move_tree(user, project, &sub, &target, completed)?;
        }
        self.close_folder_move(user, project, src).map_err(halt(src))?;
        completed.push(src.to_string());
        Ok(())
    }

    // ── Folder nodes ───────────────────────────────────────────────────────

    /// Live children of `folder`, split into files and subfolders. No
    /// permission filtering: each child is checked when it is handled.
    fn child_paths(
        &self,
        user: &UserId,
        project: ProjectId,
        folder: &str,
    ) -> BrokerResult<(Vec<String>, Vec<String>)> {
        let s = self.session(user, project, true)?;
        self.read_view(&s, |view| {
            let (folders, files): (Vec<_>, Vec<_>) = view
                .children(folder)
                .into_iter()
                .partition(|(_, e)| e.is_folder());
            Ok((
                files.into_iter().map(|(p, _)| p).collect(),
                folders.into_iter().map(|(p, _)| p).collect(),
            ))
        })
    }

    /// Delete a folder that must have no live children.
    fn delete_empty_folder(&self, user: &UserId, project: ProjectId, path: &str) -> BrokerResult<()> {
        let s = self.session(user, project, true)?;
        self.write_view(&s, |view| {
            let folder = folder_entry(view.lookup(path), path)?;
            self.authorize(&s, path, &folder, Capability::Write)?;
            if view.view().has_children(path) {
                return Err(BrokerError::not_empty(path));
            }
            self.remove_entry(&s, view, path, &folder).map(|_| ())
        })
    }

    /// Create the destination folder of a copy, owned by the caller.
    fn copy_folder_node(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
    ) -> BrokerResult<Resource> {
        let s = self.session(user, project, true)?;
        let entry = self.write_view(&s, |view| {
            let source = folder_entry(view.lookup(src), src)?;
            self.authorize(&s, src, &source, Capability::Read)?;
            self.check_destination(&s, &view.view(), dst)?;
            check_absent(&view.view(), dst, false)?;
            let copy = Entry::new(source.kind, s.user, source.group, source.flags, None);
            view.create(dst, copy, false).map_err(|e| transition_error(dst, e))
        })?;
        Ok(self.snapshot(dst, &entry))
    }

    /// Move a folder that must have no live children, in one step.
    fn move_empty_folder(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
    ) -> BrokerResult<Resource> {
        let s = self.session(user, project, true)?;
        let entry = self.write_view(&s, |view| {
            let folder = self.check_folder_source(&s, &view.view(), src)?;
            if view.view().has_children(src) {
                return Err(BrokerError::not_empty(src));
            }
            self.check_destination(&s, &view.view(), dst)?;
            self.relocate(&s, view, src, dst, &folder)
        })?;
        Ok(self.snapshot(dst, &entry))
    }

    /// First half of a folder move: the destination node appears, carrying
    /// the source folder's id, while the source still holds the children.
    fn open_folder_move(
        &self,
        user: &UserId,
        project: ProjectId,
        src: &str,
        dst: &str,
    ) -> BrokerResult<Resource> {
        let s = self.session(user, project, true)?;
        let entry = self.write_view(&s, |view| {
            let folder = self.check_folder_source(&s, &view.view(), src)?;
            self.check_destination(&s, &view.view(), dst)?;
            let revive = revives(&view.view(), dst, &folder);
            self.locks.with_slot(folder.id, |slot| {
                self.check_lock(&s, src, slot.holder())?;
                let mut node = folder.clone();
                node.touch(s.user);
                view.create(dst, node, revive).map_err(|e| transition_error(dst, e))
            })
        })?;
        Ok(self.snapshot(dst, &entry))
    }

    /// Second half of a folder move: the emptied source node goes away. The
    /// lock, keyed by id, stays with the destination.
    fn close_folder_move(&self, user: &UserId, project: ProjectId, src: &str) -> BrokerResult<()> {
        let s = self.session(user, project, true)?;
        self.write_view(&s, |view| {
            let folder = self.check_folder_source(&s, &view.view(), src)?;
            if view.view().has_children(src) {
                return Err(BrokerError::not_empty(src));
            }
            self.locks.with_slot(folder.id, |slot| {
                self.check_lock(&s, src, slot.holder())?;
                view.remove(src).map(|_| ()).map_err(|e| transition_error(src, e))
            })
        })
    }

    /// Read and write permission on a folder about to be moved.
    fn check_folder_source(&self, s: &Session, view: &View<'_>, src: &str) -> BrokerResult<Entry> {
        let folder = folder_entry(view.lookup(src), src)?;
        self.authorize(s, src, &folder, Capability::Read)?;
        self.authorize(s, src, &folder, Capability::Write)?;
        Ok(folder)
    }
}

/// True if `dst` holds the tombstone `entry` left behind earlier, so moving
/// it back may revive that path.
fn revives(view: &View<'_>, dst: &str, entry: &Entry) -> bool {
    matches!(view.lookup(dst), Lookup::Tombstone(t) if t.id == entry.id)
}

fn rebased(path: &str, from: &str, to: &str) -> String {
    path::rebase(path, from, to).unwrap_or_else(|| path::join(to, path::name(path)))
}

fn halt(path: &str) -> impl FnOnce(BrokerError) -> Halt + '_ {
    move |e| (path.to_string(), e)
}

/// Wrap the first failure of a walk.
fn partial_failure((failed, cause): Halt, completed: &[String]) -> BrokerError {
    tracing::warn!(failed = %failed, completed = completed.len(), %cause, "cascade stopped");
    BrokerError::PartialFailure {
        failed,
        completed: completed.to_vec(),
        cause: Box::new(cause),
    }
}
