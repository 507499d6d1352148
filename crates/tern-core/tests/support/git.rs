use std::fs;
use std::path::Path;

use git2::{IndexAddOption, Repository, Signature};

pub fn init_repo(root: &Path) -> Repository {
    let repo = Repository::init(root).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Tern Test").unwrap();
    config.set_str("user.email", "test@tern.dev").unwrap();
    repo
}

pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

pub fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = Signature::now("Tern Test", "test@tern.dev").unwrap();
    match repo.head() {
        Ok(head) => {
            let parent = repo.find_commit(head.target().unwrap()).unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
                .unwrap()
        }
        Err(_) => repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])
            .unwrap(),
    }
}

/// Write an app named `name` with one `main.go` per component.
pub fn write_app(app_dir: &Path, name: &str, components: &[&str]) {
    write_file(app_dir, "app.toml", &format!("name = \"{name}\"\n"));
    for component in components {
        write_file(
            app_dir,
            &format!("components/{component}/main.go"),
            &format!("package main // {component}\n"),
        );
    }
}
