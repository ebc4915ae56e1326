//! Recursive folder operations and their partial-failure reporting.

mod common;

use common::Fixture;
use vellum_kernel::{BrokerError, ErrorKind};
use vellum_types::{AccessFlags, ResourceState};

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_non_forced_needs_empty_folder() {
    let fx = Fixture::new();
    fx.site();

    let err = fx
        .broker
        .delete_folder(&fx.amy, fx.project, "/site", false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotEmpty);
    let err = fx
        .broker
        .copy_folder(&fx.amy, fx.project, "/site", "/copy", false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotEmpty);
    let err = fx
        .broker
        .move_folder(&fx.amy, fx.project, "/site", "/moved", false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotEmpty);

    // nothing was touched
    assert!(fx.exists("/site/sub/d.txt"));
    assert!(!fx.exists("/copy"));
    assert!(!fx.exists("/moved"));
}

#[test]
fn test_root_cannot_be_deleted_or_moved() {
    let fx = Fixture::new();
    let err = fx
        .broker
        .delete_folder(&fx.admin, fx.project, "/", true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    let err = fx
        .broker
        .move_folder(&fx.admin, fx.project, "/", "/x", true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[test]
fn test_empty_folder_delete_and_move() {
    let fx = Fixture::new();
    fx.folder("/empty");
    let moved = fx
        .broker
        .move_folder(&fx.amy, fx.project, "/empty", "/other", false)
        .unwrap();
    assert_eq!(moved, paths(&["/empty"]));
    assert!(fx.exists("/other"));
    assert!(!fx.exists("/empty"));

    let deleted = fx
        .broker
        .delete_folder(&fx.amy, fx.project, "/other", false)
        .unwrap();
    assert_eq!(deleted, paths(&["/other"]));
    assert!(!fx.exists("/other"));
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn test_forced_delete_order() {
    let fx = Fixture::new();
    fx.site();
    let deleted = fx
        .broker
        .delete_folder(&fx.amy, fx.project, "/site", true)
        .unwrap();
    assert_eq!(
        deleted,
        paths(&[
            "/site/a.txt",
            "/site/b.txt",
            "/site/c.txt",
            "/site/sub/d.txt",
            "/site/sub",
            "/site",
        ])
    );
    assert!(!fx.exists("/site"));
    // all of it was new in this project
    assert!(fx.broker.changed_resources(&fx.amy, fx.project).unwrap().is_empty());
}

#[test]
fn test_forced_delete_of_published_tree_leaves_tombstones() {
    let fx = Fixture::new();
    fx.site();
    fx.publish();
    fx.broker
        .delete_folder(&fx.amy, fx.project, "/site", true)
        .unwrap();

    let changed = fx.broker.changed_resources(&fx.amy, fx.project).unwrap();
    assert_eq!(changed.len(), 6);
    assert!(changed.iter().all(|r| r.state == ResourceState::Deleted));
    assert!(fx.broker.exists(&fx.amy, fx.online(), "/site/sub/d.txt").unwrap());

    let report = fx.broker.publish(&fx.amy, fx.project).unwrap();
    assert_eq!(report.removed.len(), 6);
    assert!(!fx.broker.exists(&fx.amy, fx.online(), "/site").unwrap());
}

#[test]
fn test_delete_stops_at_first_denied_child() {
    let fx = Fixture::new();
    fx.site();
    fx.broker
        .chmod(
            &fx.amy,
            fx.project,
            "/site/b.txt",
            AccessFlags::DEFAULT - AccessFlags::GROUP_WRITE,
        )
        .unwrap();

    let err = fx
        .broker
        .delete_folder(&fx.ben, fx.project, "/site", true)
        .unwrap_err();
    match err {
        BrokerError::PartialFailure {
            ref failed,
            ref completed,
            ref cause,
        } => {
            assert_eq!(failed, "/site/b.txt");
            assert_eq!(completed, &paths(&["/site/a.txt"]));
            assert_eq!(cause.kind(), ErrorKind::AccessDenied);
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::PartialFailure);

    // completed children stay deleted, the rest is untouched
    assert!(!fx.exists("/site/a.txt"));
    assert!(fx.exists("/site/b.txt"));
    assert!(fx.exists("/site/c.txt"));
    assert!(fx.exists("/site/sub/d.txt"));
}

#[test]
fn test_first_child_failure_is_partial() {
    let fx = Fixture::new();
    fx.site();
    fx.broker
        .chmod(
            &fx.amy,
            fx.project,
            "/site/a.txt",
            AccessFlags::DEFAULT - AccessFlags::GROUP_WRITE,
        )
        .unwrap();

    let err = fx
        .broker
        .delete_folder(&fx.ben, fx.project, "/site", true)
        .unwrap_err();
    match err {
        BrokerError::PartialFailure {
            ref failed,
            ref completed,
            ref cause,
        } => {
            assert_eq!(failed, "/site/a.txt");
            assert!(completed.is_empty());
            assert_eq!(cause.kind(), ErrorKind::AccessDenied);
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }
    assert!(fx.exists("/site/a.txt"));
}

#[test]
fn test_empty_folder_failure_is_plain_error() {
    let fx = Fixture::new();
    fx.folder("/empty");
    fx.broker
        .chmod(
            &fx.amy,
            fx.project,
            "/empty",
            AccessFlags::DEFAULT - AccessFlags::GROUP_WRITE,
        )
        .unwrap();

    let err = fx
        .broker
        .delete_folder(&fx.ben, fx.project, "/empty", true)
        .unwrap_err();
    assert!(matches!(err, BrokerError::AccessDenied { ref path, .. } if path == "/empty"));
}

// ============================================================================
// Copy
// ============================================================================

#[test]
fn test_forced_copy() {
    let fx = Fixture::new();
    fx.site();
    let site = fx.broker.read_folder(&fx.amy, fx.project, "/site").unwrap();

    let copied = fx
        .broker
        .copy_folder(&fx.ben, fx.project, "/site", "/copy", true)
        .unwrap();
    assert_eq!(
        copied,
        paths(&[
            "/site",
            "/site/a.txt",
            "/site/b.txt",
            "/site/c.txt",
            "/site/sub",
            "/site/sub/d.txt",
        ])
    );

    let copy = fx.broker.read_folder(&fx.ben, fx.project, "/copy").unwrap();
    assert_ne!(copy.id, site.id);
    assert_eq!(copy.owner, fx.ben);
    assert_eq!(copy.group, fx.editors);
    assert_eq!(fx.read(&fx.ben, fx.project, "/copy/sub/d.txt"), b"d");
    // source untouched
    assert_eq!(fx.read(&fx.amy, fx.project, "/site/sub/d.txt"), b"d");

    let files: Vec<String> = fx
        .broker
        .get_files_in_folder(&fx.ben, fx.project, "/copy")
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(files, paths(&["/copy/a.txt", "/copy/b.txt", "/copy/c.txt"]));
}

#[test]
fn test_copy_into_itself_is_invalid() {
    let fx = Fixture::new();
    fx.site();
    let err = fx
        .broker
        .copy_folder(&fx.amy, fx.project, "/site", "/site/sub/again", true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

// ============================================================================
// Move and rename
// ============================================================================

#[test]
fn test_forced_move_keeps_ids_and_locks() {
    let fx = Fixture::new();
    fx.site();
    fx.publish();
    let site = fx.broker.read_folder(&fx.amy, fx.project, "/site").unwrap();
    let a = fx.broker.read_file_header(&fx.amy, fx.project, "/site/a.txt").unwrap();
    fx.broker.lock(&fx.amy, fx.project, "/site/a.txt", false).unwrap();

    let moved = fx
        .broker
        .move_folder(&fx.amy, fx.project, "/site", "/moved", true)
        .unwrap();
    assert_eq!(
        moved,
        paths(&[
            "/site/a.txt",
            "/site/b.txt",
            "/site/c.txt",
            "/site/sub/d.txt",
            "/site/sub",
            "/site",
        ])
    );

    assert!(!fx.exists("/site"));
    let folder = fx.broker.read_folder(&fx.amy, fx.project, "/moved").unwrap();
    assert_eq!(folder.id, site.id);
    let moved_a = fx
        .broker
        .read_file_header(&fx.amy, fx.project, "/moved/a.txt")
        .unwrap();
    assert_eq!(moved_a.id, a.id);
    assert_eq!(moved_a.locked_by, Some(fx.amy));
    assert_eq!(fx.read(&fx.amy, fx.project, "/moved/sub/d.txt"), b"d");

    // online still has the old layout until publish
    assert!(fx.broker.exists(&fx.amy, fx.online(), "/site/a.txt").unwrap());
    fx.publish();
    assert!(!fx.broker.exists(&fx.amy, fx.online(), "/site").unwrap());
    assert_eq!(fx.read(&fx.ben, fx.online(), "/moved/sub/d.txt"), b"d");
}

#[test]
fn test_move_stops_at_locked_child() {
    let fx = Fixture::new();
    fx.site();
    fx.broker.lock(&fx.ben, fx.project, "/site/c.txt", false).unwrap();

    let err = fx
        .broker
        .move_folder(&fx.amy, fx.project, "/site", "/moved", true)
        .unwrap_err();
    match err {
        BrokerError::PartialFailure {
            ref failed,
            ref completed,
            ref cause,
        } => {
            assert_eq!(failed, "/site/c.txt");
            assert_eq!(completed, &paths(&["/site/a.txt", "/site/b.txt"]));
            assert!(matches!(**cause, BrokerError::ResourceLocked { holder, .. } if holder == fx.ben));
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }

    assert!(fx.exists("/moved/a.txt"));
    assert!(fx.exists("/moved/b.txt"));
    assert!(fx.exists("/site/c.txt"));
    assert!(fx.exists("/site/sub/d.txt"));
}

#[test]
fn test_move_locked_first_child_reports_destination() {
    let fx = Fixture::new();
    fx.site();
    fx.broker.lock(&fx.ben, fx.project, "/site/a.txt", false).unwrap();

    let err = fx
        .broker
        .move_folder(&fx.amy, fx.project, "/site", "/moved", true)
        .unwrap_err();
    match err {
        BrokerError::PartialFailure {
            ref failed,
            ref completed,
            ref cause,
        } => {
            assert_eq!(failed, "/site/a.txt");
            assert!(completed.is_empty());
            assert_eq!(cause.kind(), ErrorKind::ResourceLocked);
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }

    // the destination node was already created
    assert!(fx.exists("/moved"));
    assert!(fx.exists("/site"));
    assert!(fx.exists("/site/a.txt"));
    assert!(!fx.exists("/moved/a.txt"));
}

#[test]
fn test_move_into_itself_is_invalid() {
    let fx = Fixture::new();
    fx.site();
    let err = fx
        .broker
        .move_folder(&fx.amy, fx.project, "/site", "/site/sub/site", true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[test]
fn test_move_onto_existing_path_fails() {
    let fx = Fixture::new();
    fx.site();
    fx.folder("/taken");
    let err = fx
        .broker
        .move_folder(&fx.amy, fx.project, "/site", "/taken", true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(fx.exists("/site/a.txt"));
}

#[test]
fn test_rename_folder() {
    let fx = Fixture::new();
    fx.site();
    let renamed = fx
        .broker
        .rename_folder(&fx.amy, fx.project, "/site", "www", true)
        .unwrap();
    assert_eq!(renamed.len(), 6);
    assert_eq!(renamed.last().map(String::as_str), Some("/site"));
    assert_eq!(fx.read(&fx.amy, fx.project, "/www/b.txt"), b"b");
    assert!(!fx.exists("/site"));

    let folders: Vec<String> = fx
        .broker
        .get_sub_folders(&fx.amy, fx.project, "/www")
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(folders, paths(&["/www/sub"]));

    let err = fx
        .broker
        .rename_folder(&fx.amy, fx.project, "/www", "a/b", true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
}

#[test]
fn test_move_back_onto_own_tombstone_revives() {
    let fx = Fixture::new();
    fx.folder("/docs");
    fx.publish();
    let docs = fx.broker.read_folder(&fx.amy, fx.project, "/docs").unwrap();

    fx.broker
        .move_folder(&fx.amy, fx.project, "/docs", "/archive", false)
        .unwrap();
    fx.broker
        .move_folder(&fx.amy, fx.project, "/archive", "/docs", false)
        .unwrap();

    let back = fx.broker.read_folder(&fx.amy, fx.project, "/docs").unwrap();
    assert_eq!(back.id, docs.id);
    assert_eq!(back.state, ResourceState::Changed);
    assert!(!fx.exists("/archive"));
}
