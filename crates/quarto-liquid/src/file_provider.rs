/*
 * file_provider.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template file access for `include`, `render` and layouts.
//!
//! The engine does not look for files on its own. Tags that load other
//! templates read a [`FileProvider`] from the render's ambient values and
//! resolve names with [`resolve_partial_path`]. Paths handed to a provider
//! are `/`-separated and relative to the provider's root.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use regex::Regex;

use crate::error::FileProviderError;

/// Extension given to partial names that have none.
pub const DEFAULT_EXTENSION: &str = "liquid";

/// Reports whether the files matched by a watch pattern changed since the
/// token was created.
#[derive(Clone)]
pub struct ChangeToken {
    check: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl ChangeToken {
    pub fn new(check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            check: Arc::new(check),
        }
    }

    /// A token that never fires.
    pub fn never() -> Self {
        Self::new(|| false)
    }

    pub fn has_changed(&self) -> bool {
        (self.check)()
    }
}

impl std::fmt::Debug for ChangeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeToken").finish_non_exhaustive()
    }
}

/// Host capability for reading template files.
pub trait FileProvider: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn read(&self, path: &str) -> Result<String, FileProviderError>;

    /// Watch the files matching a glob (`*` within a segment, `**` across).
    fn watch(&self, pattern: &str) -> ChangeToken;
}

/// Resolve a partial name against the template that references it.
///
/// - a name without an extension gets `.liquid`
/// - a name starting with `/` is relative to the provider root
/// - any other name is relative to the directory of `current`
pub fn resolve_partial_path(name: &str, current: Option<&str>) -> String {
    let with_extension = if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{}.{}", name, DEFAULT_EXTENSION)
    };

    let joined = match (with_extension.strip_prefix('/'), current) {
        (Some(rooted), _) => rooted.to_string(),
        (None, Some(current)) => match current.rfind('/') {
            Some(slash) => format!("{}/{}", &current[..slash], with_extension),
            None => with_extension,
        },
        (None, None) => with_extension,
    };
    normalize(&joined)
}

/// Collapse `.` and `..` segments. Leading `..` segments are kept so that
/// providers can reject them.
fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Compile a watch glob into a regex anchored at both ends.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut expression = String::from("^");
    let mut rest = pattern.trim_start_matches('/');
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("**") {
            expression.push_str(".*");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('*') {
            expression.push_str("[^/]*");
            rest = tail;
        } else {
            let next = rest.find('*').unwrap_or(rest.len());
            expression.push_str(&regex::escape(&rest[..next]));
            rest = &rest[next..];
        }
    }
    expression.push('$');
    Regex::new(&expression).ok()
}

// ============================================================================
// In-memory provider
// ============================================================================

#[derive(Debug, Default)]
struct MemoryFiles {
    files: HashMap<String, (String, u64)>,
    version: u64,
}

/// Templates held in memory. Tokens fire when a watched file is added,
/// replaced or removed.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileProvider {
    state: Arc<RwLock<MemoryFiles>>,
}

impl MemoryFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<K, V>(files: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let provider = Self::new();
        for (path, content) in files {
            provider.insert(path, content);
        }
        provider
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.version += 1;
            let version = state.version;
            state.files.insert(normalize(&path.into()), (content.into(), version));
        }
    }

    pub fn remove(&self, path: &str) {
        if let Ok(mut state) = self.state.write() {
            state.files.remove(&normalize(path));
        }
    }

    fn snapshot(state: &RwLock<MemoryFiles>, pattern: &Regex) -> Vec<(String, u64)> {
        let Ok(state) = state.read() else {
            return Vec::new();
        };
        let mut matching: Vec<(String, u64)> = state
            .files
            .iter()
            .filter(|(path, _)| pattern.is_match(path))
            .map(|(path, (_, version))| (path.clone(), *version))
            .collect();
        matching.sort();
        matching
    }
}

impl FileProvider for MemoryFileProvider {
    fn exists(&self, path: &str) -> bool {
        self.state
            .read()
            .map(|state| state.files.contains_key(&normalize(path)))
            .unwrap_or(false)
    }

    fn read(&self, path: &str) -> Result<String, FileProviderError> {
        let normalized = normalize(path);
        let state = self.state.read().map_err(|_| FileProviderError::Io {
            path: normalized.clone(),
            source: std::io::Error::other("file table lock poisoned"),
        })?;
        state
            .files
            .get(&normalized)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| FileProviderError::Io {
                path: normalized.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }

    fn watch(&self, pattern: &str) -> ChangeToken {
        let Some(regex) = glob_regex(pattern) else {
            return ChangeToken::never();
        };
        let state = Arc::clone(&self.state);
        let initial = Self::snapshot(&state, &regex);
        ChangeToken::new(move || Self::snapshot(&state, &regex) != initial)
    }
}

// ============================================================================
// File system provider
// ============================================================================

/// Templates below a root directory. Tokens compare modification times.
#[derive(Debug, Clone)]
pub struct FileSystemProvider {
    root: PathBuf,
}

impl FileSystemProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, FileProviderError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(FileProviderError::OutsideRoot(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn snapshot(root: &Path, pattern: &Regex) -> Vec<(String, Option<SystemTime>)> {
        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let relative: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                let relative = relative.join("/");
                if pattern.is_match(&relative) {
                    let modified = entry.metadata().and_then(|m| m.modified()).ok();
                    found.push((relative, modified));
                }
            }
        }
        found.sort();
        found
    }
}

impl FileProvider for FileSystemProvider {
    fn exists(&self, path: &str) -> bool {
        self.full_path(path).is_ok_and(|p| p.is_file())
    }

    fn read(&self, path: &str) -> Result<String, FileProviderError> {
        let full = self.full_path(path)?;
        std::fs::read_to_string(&full).map_err(|source| FileProviderError::Io {
            path: path.to_string(),
            source,
        })
    }

    fn watch(&self, pattern: &str) -> ChangeToken {
        let Some(regex) = glob_regex(pattern) else {
            return ChangeToken::never();
        };
        let root = self.root.clone();
        let initial = Self::snapshot(&root, &regex);
        ChangeToken::new(move || Self::snapshot(&root, &regex) != initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Path resolution
    // ========================================================================

    #[test]
    fn test_resolve_adds_extension() {
        assert_eq!(resolve_partial_path("header", None), "header.liquid");
        assert_eq!(resolve_partial_path("header.html", None), "header.html");
    }

    #[test]
    fn test_resolve_relative_to_current() {
        assert_eq!(
            resolve_partial_path("card", Some("pages/index.liquid")),
            "pages/card.liquid"
        );
        assert_eq!(
            resolve_partial_path("../shared/card", Some("pages/index.liquid")),
            "shared/card.liquid"
        );
        assert_eq!(
            resolve_partial_path("/layouts/main", Some("pages/index.liquid")),
            "layouts/main.liquid"
        );
    }

    #[test]
    fn test_normalize_keeps_escaping_segments() {
        assert_eq!(normalize("../x"), "../x");
        assert_eq!(normalize("a/./b/../c"), "a/c");
    }

    #[test]
    fn test_glob_regex() {
        let regex = glob_regex("partials/*.liquid").unwrap();
        assert!(regex.is_match("partials/a.liquid"));
        assert!(!regex.is_match("partials/deep/a.liquid"));
        let regex = glob_regex("**/*.liquid").unwrap();
        assert!(regex.is_match("partials/deep/a.liquid"));
    }

    // ========================================================================
    // Providers
    // ========================================================================

    #[test]
    fn test_memory_provider() {
        let provider = MemoryFileProvider::with_files([("a.liquid", "A"), ("dir/b.liquid", "B")]);
        assert!(provider.exists("a.liquid"));
        assert!(provider.exists("./dir/b.liquid"));
        assert_eq!(provider.read("dir/b.liquid").unwrap(), "B");
        assert!(provider.read("missing.liquid").is_err());
    }

    #[test]
    fn test_memory_change_token() {
        let provider = MemoryFileProvider::with_files([("a.liquid", "A"), ("b.txt", "B")]);
        let token = provider.watch("*.liquid");
        assert!(!token.has_changed());

        provider.insert("b.txt", "changed");
        assert!(!token.has_changed());

        provider.insert("a.liquid", "A2");
        assert!(token.has_changed());
    }

    #[test]
    fn test_file_system_provider() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("partials")).unwrap();
        std::fs::write(dir.path().join("partials/card.liquid"), "card").unwrap();

        let provider = FileSystemProvider::new(dir.path());
        assert!(provider.exists("partials/card.liquid"));
        assert_eq!(provider.read("partials/card.liquid").unwrap(), "card");
        assert!(matches!(
            provider.read("../etc/passwd"),
            Err(FileProviderError::OutsideRoot(_))
        ));

        let token = provider.watch("**/*.liquid");
        assert!(!token.has_changed());
        std::fs::write(dir.path().join("partials/new.liquid"), "new").unwrap();
        assert!(token.has_changed());
    }
}
