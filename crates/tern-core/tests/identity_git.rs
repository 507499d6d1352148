mod support;

use std::path::Path;

use tempfile::TempDir;

use tern_core::Error;
use tern_core::git::{GitRepo, VersionControl};
use tern_core::identity::{derive_content_hash, derive_identity};

use support::git::{commit_all, init_repo, write_app, write_file};

#[test]
fn identity_only_changes_with_its_own_scope() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    write_app(temp.path(), "shop", &["backend", "frontend"]);
    let first = commit_all(&repo, "initial app");

    write_file(temp.path(), "components/frontend/main.go", "package main // v2\n");
    let second = commit_all(&repo, "change frontend");

    write_file(temp.path(), "README.md", "unrelated\n");
    commit_all(&repo, "docs");

    let vcs = GitRepo::discover(temp.path()).unwrap();
    let backend = derive_identity(&vcs, "backend", Path::new("components/backend")).unwrap();
    let frontend = derive_identity(&vcs, "frontend", Path::new("components/frontend")).unwrap();

    assert_eq!(backend.content_hash, first.to_string());
    assert_eq!(frontend.content_hash, second.to_string());
    assert_eq!(backend.short(), &first.to_string()[..7]);
}

#[test]
fn identity_is_deterministic_across_reads() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    write_app(temp.path(), "shop", &["api"]);
    commit_all(&repo, "initial app");

    let vcs = GitRepo::discover(temp.path()).unwrap();
    let a = derive_content_hash(&vcs, Path::new("components/api")).unwrap();
    let b = derive_content_hash(&vcs, Path::new("components/api")).unwrap();
    assert_eq!(a, b);
}

#[test]
fn dirty_tree_yields_no_identity() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    write_app(temp.path(), "shop", &["api"]);
    commit_all(&repo, "initial app");

    write_file(temp.path(), "components/api/new.go", "package main\n");

    let vcs = GitRepo::discover(temp.path()).unwrap();
    assert!(!vcs.is_clean().unwrap());
    let result = derive_identity(&vcs, "api", Path::new("components/api"));
    assert!(matches!(result, Err(Error::UncommittedChanges(_))));
}

#[test]
fn ignored_files_do_not_make_the_tree_dirty() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    write_app(temp.path(), "shop", &["api"]);
    write_file(temp.path(), ".gitignore", "target/\n");
    commit_all(&repo, "initial app");

    write_file(temp.path(), "target/output.bin", "build output");

    let vcs = GitRepo::discover(temp.path()).unwrap();
    assert!(vcs.is_clean().unwrap());
}

#[test]
fn untouched_scope_has_no_history() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    write_app(temp.path(), "shop", &["api"]);
    commit_all(&repo, "initial app");

    let vcs = GitRepo::discover(temp.path()).unwrap();
    let result = derive_content_hash(&vcs, Path::new("components/worker"));
    assert!(matches!(result, Err(Error::NoHistory(_))));
}

#[test]
fn created_tag_is_reported_on_head() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    write_app(temp.path(), "shop", &["api"]);
    commit_all(&repo, "initial app");

    let vcs = GitRepo::discover(temp.path()).unwrap();
    assert_eq!(vcs.head_ref().unwrap().tag_name(), None);

    vcs.create_tag("v1.0.0").unwrap();
    let head = vcs.head_ref().unwrap();
    assert_eq!(head.tag_name(), Some("v1.0.0"));
    assert!(head.branch_name().is_some());
}
