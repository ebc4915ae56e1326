//! Single-resource broker operations across online and offline projects.

mod common;

use common::Fixture;
use vellum_kernel::{BrokerError, CreateOptions, ErrorKind, LockOutcome};
use vellum_types::{AccessFlags, Group, HeaderUpdate, ProjectState, ResourceState, ResourceType};

// ============================================================================
// Lifecycle scenario
// ============================================================================

#[test]
fn test_edit_lock_publish_scenario() {
    let fx = Fixture::new();
    fx.folder("/a");
    let b = fx.file("/a/b.txt", b"first");
    assert_eq!(b.state, ResourceState::New);
    assert_eq!(b.group, fx.editors);

    assert_eq!(
        fx.broker.lock(&fx.amy, fx.project, "/a/b.txt", false).unwrap(),
        LockOutcome::Acquired
    );

    // ben could write (same group) but amy holds the lock
    let err = fx
        .broker
        .write_file(&fx.ben, fx.project, "/a/b.txt", b"ben")
        .unwrap_err();
    match err {
        BrokerError::ResourceLocked { ref path, holder } => {
            assert_eq!(path, "/a/b.txt");
            assert_eq!(holder, fx.amy);
        }
        other => panic!("expected ResourceLocked, got {other:?}"),
    }

    let written = fx
        .broker
        .write_file(&fx.amy, fx.project, "/a/b.txt", b"second")
        .unwrap();
    assert_eq!(written.state, ResourceState::New);
    assert_eq!(written.locked_by, Some(fx.amy));

    let report = fx.broker.publish(&fx.amy, fx.project).unwrap();
    assert_eq!(report.published, vec!["/a", "/a/b.txt"]);
    assert!(report.removed.is_empty());

    let online = fx.broker.read_file(&fx.ben, fx.online(), "/a/b.txt").unwrap();
    assert_eq!(online.bytes, b"second");
    assert_eq!(online.resource.state, ResourceState::Unchanged);
    assert_eq!(online.resource.locked_by, None);
    assert_eq!(online.resource.id, b.id);
    let folder = fx.broker.read_folder(&fx.ben, fx.online(), "/a").unwrap();
    assert_eq!(folder.state, ResourceState::Unchanged);
    assert!(fx.broker.changed_resources(&fx.amy, fx.project).unwrap().is_empty());
}

#[test]
fn test_create_read_roundtrip() {
    let fx = Fixture::new();
    let body: Vec<u8> = (0..=255).collect();
    fx.file("/blob.bin", &body);
    let file = fx.broker.read_file(&fx.amy, fx.project, "/blob.bin").unwrap();
    assert_eq!(file.bytes, body);
    assert_eq!(file.resource.length(), 256);
    assert_eq!(file.resource.kind, ResourceType::PlainText);

    let header = fx
        .broker
        .read_file_header(&fx.amy, fx.project, "blob.bin")
        .unwrap();
    assert_eq!(header.path, "/blob.bin");
    assert_eq!(header.owner, fx.amy);
}

#[test]
fn test_publish_twice_is_noop() {
    let fx = Fixture::new();
    fx.site();
    let first = fx.broker.publish(&fx.amy, fx.project).unwrap();
    assert_eq!(first.published.len(), 6);
    let second = fx.broker.publish(&fx.amy, fx.project).unwrap();
    assert!(second.is_empty());
}

// ============================================================================
// Offline isolation
// ============================================================================

#[test]
fn test_offline_edits_stay_offline_until_publish() {
    let fx = Fixture::new();
    fx.folder("/site");
    fx.file("/site/index.html", b"v1");
    fx.publish();

    let changed = fx
        .broker
        .write_file(&fx.amy, fx.project, "/site/index.html", b"v2")
        .unwrap();
    assert_eq!(changed.state, ResourceState::Changed);

    assert_eq!(fx.read(&fx.amy, fx.online(), "/site/index.html"), b"v1");
    assert_eq!(fx.read(&fx.amy, fx.project, "/site/index.html"), b"v2");

    let autumn = fx.broker.create_project(&fx.ben, "autumn", None).unwrap();
    let seen = fx.broker.read_file(&fx.ben, autumn.id, "/site/index.html").unwrap();
    assert_eq!(seen.bytes, b"v1");
    assert_eq!(seen.resource.state, ResourceState::Unchanged);

    let report = fx.broker.publish(&fx.amy, fx.project).unwrap();
    assert_eq!(report.published, vec!["/site/index.html"]);
    assert_eq!(report.discarded, 1);
    assert_eq!(fx.read(&fx.ben, autumn.id, "/site/index.html"), b"v2");
}

#[test]
fn test_create_then_delete_leaves_no_trace() {
    let fx = Fixture::new();
    fx.file("/draft.txt", b"x");
    fx.broker.delete_file(&fx.amy, fx.project, "/draft.txt").unwrap();
    assert!(!fx.exists("/draft.txt"));
    assert!(fx.broker.changed_resources(&fx.amy, fx.project).unwrap().is_empty());
}

#[test]
fn test_delete_published_file_leaves_tombstone() {
    let fx = Fixture::new();
    fx.file("/old.txt", b"old");
    fx.publish();

    fx.broker.delete_file(&fx.amy, fx.project, "/old.txt").unwrap();
    assert!(!fx.exists("/old.txt"));
    assert!(fx.broker.exists(&fx.amy, fx.online(), "/old.txt").unwrap());

    let changed = fx.broker.changed_resources(&fx.amy, fx.project).unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].state, ResourceState::Deleted);

    let err = fx
        .broker
        .create_file(&fx.amy, fx.project, "/old.txt", b"new", CreateOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let revived = fx
        .broker
        .create_file(&fx.amy, fx.project, "/old.txt", b"new", CreateOptions::new().force())
        .unwrap();
    assert_eq!(revived.state, ResourceState::Changed);

    fx.publish();
    assert_eq!(fx.read(&fx.amy, fx.online(), "/old.txt"), b"new");
}

#[test]
fn test_publish_removes_tombstones() {
    let fx = Fixture::new();
    fx.file("/gone.txt", b"bye");
    fx.publish();
    fx.broker.delete_file(&fx.amy, fx.project, "/gone.txt").unwrap();

    let report = fx.broker.publish(&fx.amy, fx.project).unwrap();
    assert_eq!(report.removed, vec!["/gone.txt"]);
    assert!(!fx.broker.exists(&fx.amy, fx.online(), "/gone.txt").unwrap());
}

#[test]
fn test_publish_refuses_child_of_folder_removed_elsewhere() {
    let fx = Fixture::new();
    fx.folder("/f");
    fx.file("/f/old.txt", b"old");
    fx.publish();

    let autumn = fx.broker.create_project(&fx.ben, "autumn", None).unwrap().id;
    fx.broker
        .create_file(&fx.ben, autumn, "/f/new.txt", b"new", CreateOptions::new())
        .unwrap();
    fx.broker.delete_folder(&fx.amy, fx.project, "/f", true).unwrap();
    fx.publish();

    let err = fx.broker.publish(&fx.ben, autumn).unwrap_err();
    assert!(matches!(
        err,
        BrokerError::MissingParent { ref path, ref parent } if path == "/f/new.txt" && parent == "/f"
    ));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!fx.broker.exists(&fx.amy, fx.online(), "/f/new.txt").unwrap());
    assert!(fx.broker.exists(&fx.ben, autumn, "/f/new.txt").unwrap());

    // recreating the folder in the project makes it publishable again
    assert!(!fx.broker.exists(&fx.ben, autumn, "/f").unwrap());
    fx.broker
        .create_folder(&fx.ben, autumn, "/f", CreateOptions::new())
        .unwrap();
    fx.broker.publish(&fx.ben, autumn).unwrap();
    let files: Vec<String> = fx
        .broker
        .get_files_in_folder(&fx.amy, fx.online(), "/f")
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(files, vec!["/f/new.txt"]);
}

#[test]
fn test_publish_refuses_folder_removal_over_new_child() {
    let fx = Fixture::new();
    fx.folder("/f");
    fx.file("/f/old.txt", b"old");
    fx.publish();

    let autumn = fx.broker.create_project(&fx.ben, "autumn", None).unwrap().id;
    fx.broker.delete_folder(&fx.amy, fx.project, "/f", true).unwrap();
    fx.broker
        .create_file(&fx.ben, autumn, "/f/new.txt", b"new", CreateOptions::new())
        .unwrap();
    fx.broker.publish(&fx.ben, autumn).unwrap();

    let err = fx.broker.publish(&fx.amy, fx.project).unwrap_err();
    assert!(matches!(err, BrokerError::NotEmpty(ref p) if p == "/f"));
    assert!(fx.broker.exists(&fx.amy, fx.online(), "/f/new.txt").unwrap());
    assert!(fx.broker.exists(&fx.amy, fx.online(), "/f/old.txt").unwrap());

    // the new child shows through the tombstoned folder until removed
    fx.broker.delete_file(&fx.amy, fx.project, "/f/new.txt").unwrap();
    fx.publish();
    assert!(!fx.broker.exists(&fx.amy, fx.online(), "/f").unwrap());
    assert!(!fx.broker.exists(&fx.amy, fx.online(), "/f/new.txt").unwrap());
}

// ============================================================================
// Rename, move, copy
// ============================================================================

#[test]
fn test_rename_keeps_id_and_lock() {
    let fx = Fixture::new();
    fx.folder("/site");
    let a = fx.file("/site/a.txt", b"a");
    fx.publish();
    fx.broker.lock(&fx.amy, fx.project, "/site/a.txt", false).unwrap();

    let renamed = fx
        .broker
        .rename_file(&fx.amy, fx.project, "/site/a.txt", "b.txt")
        .unwrap();
    assert_eq!(renamed.id, a.id);
    assert_eq!(renamed.path, "/site/b.txt");
    assert_eq!(renamed.state, ResourceState::New);
    assert_eq!(renamed.locked_by, Some(fx.amy));

    let changed: Vec<(String, ResourceState)> = fx
        .broker
        .changed_resources(&fx.amy, fx.project)
        .unwrap()
        .into_iter()
        .map(|r| (r.path, r.state))
        .collect();
    assert_eq!(
        changed,
        vec![
            ("/site/a.txt".to_string(), ResourceState::Deleted),
            ("/site/b.txt".to_string(), ResourceState::New),
        ]
    );

    let err = fx
        .broker
        .write_file(&fx.ben, fx.project, "/site/b.txt", b"ben")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceLocked);

    fx.publish();
    let online = fx.broker.read_file_header(&fx.amy, fx.online(), "/site/b.txt").unwrap();
    assert_eq!(online.id, a.id);
    assert_eq!(online.locked_by, None);
    assert!(!fx.broker.exists(&fx.amy, fx.online(), "/site/a.txt").unwrap());
}

#[test]
fn test_rename_rejects_bad_names_and_collisions() {
    let fx = Fixture::new();
    fx.file("/a.txt", b"a");
    fx.file("/b.txt", b"b");
    let err = fx
        .broker
        .rename_file(&fx.amy, fx.project, "/a.txt", "x/y")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
    let err = fx
        .broker
        .rename_file(&fx.amy, fx.project, "/a.txt", "b.txt")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn test_move_file() {
    let fx = Fixture::new();
    fx.folder("/from");
    fx.folder("/to");
    let f = fx.file("/from/page.xml", b"<p/>");

    let moved = fx
        .broker
        .move_file(&fx.amy, fx.project, "/from/page.xml", "/to/page.xml")
        .unwrap();
    assert_eq!(moved.id, f.id);
    assert!(!fx.exists("/from/page.xml"));
    assert_eq!(fx.read(&fx.amy, fx.project, "/to/page.xml"), b"<p/>");

    let err = fx
        .broker
        .move_file(&fx.amy, fx.project, "/to/page.xml", "/nowhere/page.xml")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_copy_file_is_independent() {
    let fx = Fixture::new();
    fx.folder("/site");
    let original = fx.file("/site/a.txt", b"same");

    let copy = fx
        .broker
        .copy_file(&fx.ben, fx.project, "/site/a.txt", "/site/copy.txt")
        .unwrap();
    assert_ne!(copy.id, original.id);
    assert_eq!(copy.owner, fx.ben);
    assert_eq!(copy.state, ResourceState::New);
    assert_eq!(fx.read(&fx.ben, fx.project, "/site/copy.txt"), b"same");

    fx.broker
        .write_file(&fx.ben, fx.project, "/site/copy.txt", b"changed")
        .unwrap();
    assert_eq!(fx.read(&fx.amy, fx.project, "/site/a.txt"), b"same");

    let err = fx
        .broker
        .copy_file(&fx.ben, fx.project, "/site/a.txt", "/site/copy.txt")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

// ============================================================================
// Headers
// ============================================================================

#[test]
fn test_write_header() {
    let fx = Fixture::new();
    fx.file("/doc.xml", b"<doc/>");
    let updated = fx
        .broker
        .write_header(
            &fx.amy,
            fx.project,
            "/doc.xml",
            HeaderUpdate::new()
                .with_kind(ResourceType::XmlTemplate)
                .with_flags(AccessFlags::OWNER),
        )
        .unwrap();
    assert_eq!(updated.kind, ResourceType::XmlTemplate);
    assert_eq!(updated.flags, AccessFlags::OWNER);

    let err = fx
        .broker
        .write_header(
            &fx.amy,
            fx.project,
            "/doc.xml",
            HeaderUpdate::new().with_kind(ResourceType::Folder),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[test]
fn test_chown_and_chgrp_need_owner() {
    let fx = Fixture::new();
    fx.folder("/site");
    fx.file("/site/a.txt", b"a");

    let err = fx
        .broker
        .chown(&fx.ben, fx.project, "/site/a.txt", fx.ben)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);

    let r = fx.broker.chown(&fx.amy, fx.project, "/site/a.txt", fx.ben).unwrap();
    assert_eq!(r.owner, fx.ben);

    let reviewers = fx.directory.add_group(Group::new("reviewers"));
    let err = fx
        .broker
        .chgrp(&fx.amy, fx.project, "/site/a.txt", reviewers)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    let r = fx
        .broker
        .chgrp(&fx.ben, fx.project, "/site/a.txt", reviewers)
        .unwrap();
    assert_eq!(r.group, reviewers);
}

// ============================================================================
// Project rules
// ============================================================================

#[test]
fn test_online_project_is_read_only() {
    let fx = Fixture::new();
    let err = fx
        .broker
        .create_file(&fx.amy, fx.online(), "/x.txt", b"x", CreateOptions::new())
        .unwrap_err();
    assert!(matches!(err, BrokerError::OnlineReadOnly(_)));
    assert_eq!(err.kind(), ErrorKind::ProjectLocked);
    assert!(fx.broker.changed_resources(&fx.amy, fx.online()).unwrap().is_empty());
}

#[test]
fn test_locked_and_archived_projects_reject_changes() {
    let fx = Fixture::new();
    fx.file("/a.txt", b"a");

    let err = fx
        .broker
        .set_project_state(&fx.ben, fx.project, ProjectState::Locked)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);

    fx.broker
        .set_project_state(&fx.amy, fx.project, ProjectState::Locked)
        .unwrap();
    let err = fx
        .broker
        .write_file(&fx.amy, fx.project, "/a.txt", b"b")
        .unwrap_err();
    assert!(matches!(err, BrokerError::ProjectLocked { state: ProjectState::Locked, .. }));
    // reads still work
    assert_eq!(fx.read(&fx.amy, fx.project, "/a.txt"), b"a");

    fx.broker.archive(&fx.amy, fx.project).unwrap();
    let err = fx
        .broker
        .set_project_state(&fx.amy, fx.project, ProjectState::Unlocked)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProjectLocked);
    let err = fx.broker.publish(&fx.amy, fx.project).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProjectLocked);
}

#[test]
fn test_project_access_group() {
    let fx = Fixture::new();
    let managers = fx.directory.add_group(Group::new("managers"));
    let private = fx
        .broker
        .create_project(&fx.amy, "private", Some(managers))
        .unwrap();

    let err = fx.broker.exists(&fx.ben, private.id, "/").unwrap_err();
    assert!(matches!(err, BrokerError::ProjectAccessDenied { .. }));
    assert!(fx.broker.exists(&fx.amy, private.id, "/").unwrap());
    assert!(fx.broker.exists(&fx.admin, private.id, "/").unwrap());

    fx.directory.add_member(managers, fx.ben);
    assert!(fx.broker.exists(&fx.ben, private.id, "/").unwrap());

    let err = fx.broker.create_project(&fx.ben, "private", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn test_only_creator_or_admin_publishes() {
    let fx = Fixture::new();
    fx.file("/a.txt", b"a");
    let err = fx.broker.publish(&fx.ben, fx.project).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    let report = fx.broker.publish(&fx.admin, fx.project).unwrap();
    assert_eq!(report.published, vec!["/a.txt"]);
}

// ============================================================================
// Paths and kinds
// ============================================================================

#[test]
fn test_path_errors() {
    let fx = Fixture::new();
    let err = fx
        .broker
        .create_file(&fx.amy, fx.project, "/../etc/passwd", b"", CreateOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);

    let err = fx
        .broker
        .create_file(&fx.amy, fx.project, "/missing/a.txt", b"", CreateOptions::new())
        .unwrap_err();
    assert!(matches!(err, BrokerError::NotFound(ref p) if p == "/missing"));

    fx.file("/a.txt", b"a");
    let err = fx
        .broker
        .create_file(&fx.amy, fx.project, "/a.txt/b.txt", b"", CreateOptions::new())
        .unwrap_err();
    assert!(matches!(err, BrokerError::NotAFolder(_)));

    let err = fx.broker.read_file(&fx.amy, fx.project, "/").unwrap_err();
    assert!(matches!(err, BrokerError::NotAFile(_)));
}

#[test]
fn test_custom_resource_types() {
    let fx = Fixture::new();
    let r = fx
        .broker
        .create_file(
            &fx.amy,
            fx.project,
            "/page.jsp",
            b"<%%>",
            CreateOptions::new().with_kind(ResourceType::Custom(42)),
        )
        .unwrap();
    assert_eq!(r.kind, ResourceType::Custom(42));

    let err = fx
        .broker
        .create_file(
            &fx.amy,
            fx.project,
            "/dir",
            b"",
            CreateOptions::new().with_kind(ResourceType::Folder),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}
