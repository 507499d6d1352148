//! Build context archive.
//!
//! The context is the whole repository tree (minus `.dockerignore` patterns)
//! plus the component's recipe injected at [`INJECTED_RECIPE`], so one
//! recipe can build any component from the repository root.

use std::io::Cursor;
use std::path::Path;

use tar::{Builder, Header};
use walkdir::WalkDir;

use crate::app::to_slash;
use crate::error::Result;

/// Reserved name the recipe is stored under inside the context.
pub const INJECTED_RECIPE: &str = "__Dockerfile";

const IGNORE_FILE: &str = ".dockerignore";

/// Ordered exclusion rules; the last matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRules {
    rules: Vec<(bool, Vec<String>)>,
}

impl IgnoreRules {
    pub fn parse(content: &str) -> Self {
        let rules = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                let (negated, pattern) = match line.strip_prefix('!') {
                    Some(rest) => (true, rest.trim()),
                    None => (false, line),
                };
                (negated, split_pattern(pattern))
            })
            .filter(|(_, segments)| !segments.is_empty())
            .collect();
        Self { rules }
    }

    /// Rules from `<root>/.dockerignore`, or just `.git` when absent.
    pub fn load(root: &Path) -> Result<Self> {
        match std::fs::read_to_string(root.join(IGNORE_FILE)) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::parse(".git")),
            Err(err) => Err(err.into()),
        }
    }

    fn has_negations(&self) -> bool {
        self.rules.iter().any(|(negated, _)| *negated)
    }

    /// `rel` uses forward slashes and is relative to the context root.
    pub fn is_excluded(&self, rel: &str) -> bool {
        let path: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
        let mut excluded = false;
        for (negated, pattern) in &self.rules {
            let hit = (1..=path.len()).any(|n| match_segments(pattern, &path[..n]));
            if hit {
                excluded = !negated;
            }
        }
        excluded
    }
}

fn split_pattern(pattern: &str) -> Vec<String> {
    pattern
        .trim_start_matches("./")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}

fn match_segments(pattern: &[String], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((head, rest)) if head == "**" => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((head, rest)) => match path.split_first() {
            Some((first, tail)) => match_glob(head.as_bytes(), first.as_bytes()) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// Single-segment glob supporting `*` and `?`.
fn match_glob(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.split_first(), text.split_first()) {
        (None, None) => true,
        (Some((b'*', rest)), _) => {
            match_glob(rest, text) || (!text.is_empty() && match_glob(pattern, &text[1..]))
        }
        (Some((b'?', rest)), Some((_, tail))) => match_glob(rest, tail),
        (Some((p, rest)), Some((t, tail))) if p == t => match_glob(rest, tail),
        _ => false,
    }
}

/// Tar the repository at `root` with `recipe` injected.
pub fn build_context(root: &Path, recipe: &[u8]) -> Result<Vec<u8>> {
    let rules = IgnoreRules::load(root)?;
    let descend_excluded = rules.has_negations();

    let mut builder = Builder::new(Vec::new());
    builder.follow_symlinks(false);

    let mut header = Header::new_gnu();
    header.set_size(recipe.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, INJECTED_RECIPE, Cursor::new(recipe))?;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let Ok(rel) = entry.path().strip_prefix(root) else {
                return true;
            };
            let rel = to_slash(rel);
            rel.is_empty()
                || !entry.file_type().is_dir()
                || descend_excluded
                || !rules.is_excluded(&rel)
        });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map(to_slash)
            .unwrap_or_default();
        if rel.is_empty() || rules.is_excluded(&rel) {
            continue;
        }
        if entry.file_type().is_dir() {
            builder.append_dir(&rel, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &rel)?;
        }
    }

    Ok(builder.into_inner()?)
}
