//! Shared fixture for broker integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use vellum_kernel::{
    Broker, BrokerConfig, ContentStore, CreateOptions, MemoryStore, StaticDirectory,
};
use vellum_types::{Group, GroupId, ProjectId, Resource, User, UserId};

pub struct Fixture {
    pub broker: Broker,
    pub directory: Arc<StaticDirectory>,
    pub admin: UserId,
    /// Creator of the `spring` project, member of `editors`.
    pub amy: UserId,
    /// Member of `editors`.
    pub ben: UserId,
    /// In no group at all.
    pub cat: UserId,
    pub editors: GroupId,
    /// Offline project `spring`, created by amy, open to everyone.
    pub project: ProjectId,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    pub fn with_config(config: BrokerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: BrokerConfig, store: Arc<dyn ContentStore>) -> Self {
        init_tracing();
        let directory = Arc::new(StaticDirectory::new(config.admin_group.clone()));
        let admin = directory.add_user(User::new("admin", "Administrator"));
        directory.grant_admin(admin);
        let amy = directory.add_user(User::new("amy", "Amy Archer"));
        let ben = directory.add_user(User::new("ben", "Ben Baker"));
        let cat = directory.add_user(User::new("cat", "Cat Carter"));
        let editors = directory.add_group(Group::new("editors"));
        directory.add_member(editors, amy);
        directory.add_member(editors, ben);

        let broker = Broker::new(config, store, directory.clone());
        let project = broker.create_project(&amy, "spring", None).unwrap().id;
        Self {
            broker,
            directory,
            admin,
            amy,
            ben,
            cat,
            editors,
            project,
        }
    }

    pub fn online(&self) -> ProjectId {
        self.broker.online_project()
    }

    /// Folder owned by amy, group `editors`, default mask.
    pub fn folder(&self, path: &str) -> Resource {
        self.broker
            .create_folder(
                &self.amy,
                self.project,
                path,
                CreateOptions::new().with_group(self.editors),
            )
            .unwrap()
    }

    /// File owned by amy; inherits the parent's group.
    pub fn file(&self, path: &str, body: &[u8]) -> Resource {
        self.broker
            .create_file(&self.amy, self.project, path, body, CreateOptions::new())
            .unwrap()
    }

    /// `/site` with three files and `/site/sub/d.txt`.
    pub fn site(&self) {
        self.folder("/site");
        self.file("/site/a.txt", b"a");
        self.file("/site/b.txt", b"b");
        self.file("/site/c.txt", b"c");
        self.folder("/site/sub");
        self.file("/site/sub/d.txt", b"d");
    }

    pub fn publish(&self) {
        self.broker.publish(&self.amy, self.project).unwrap();
    }

    pub fn read(&self, user: &UserId, project: ProjectId, path: &str) -> Vec<u8> {
        self.broker.read_file(user, project, path).unwrap().bytes
    }

    pub fn exists(&self, path: &str) -> bool {
        self.broker.exists(&self.amy, self.project, path).unwrap()
    }
}
