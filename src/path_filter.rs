//! Hierarchical path inclusion for partial listings.
//!
//! Asking for `a/b` selects `a/b` itself and everything below it. Each
//! lookup walks up the parent chain until it finds a requested path or hits
//! the root, and remembers the answer for every path it passed through, so
//! siblings sharing a prefix resolve without walking again.
//!
//! The memo belongs to one filter instance; concurrent listings each build
//! their own.

use std::collections::HashMap;

use crate::entry::EntryMetadata;

/// Caller-supplied predicate, run before the path set is consulted.
pub type EntryPredicate = Box<dyn Fn(&str, &EntryMetadata) -> bool + Send>;

pub struct PathFilter {
    memo: HashMap<String, bool>,
    /// No paths requested: everything passes the path check.
    all_paths: bool,
    caller: Option<EntryPredicate>,
}

impl PathFilter {
    /// Build a filter from requested paths. Trailing `/` is ignored.
    pub fn new<I, S>(paths: I, caller: Option<EntryPredicate>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let memo: HashMap<String, bool> = paths
            .into_iter()
            .map(|p| (strip_trailing_slashes(p.as_ref()).to_string(), true))
            .collect();
        Self {
            all_paths: memo.is_empty(),
            memo,
            caller,
        }
    }

    /// Is `path` one of the requested paths or below one of them?
    ///
    /// A root (`/` or `.`) is never included, even when it was requested.
    pub fn included(&mut self, path: &str) -> bool {
        let path = strip_trailing_slashes(path);
        if is_root(path) {
            return false;
        }
        if let Some(&hit) = self.memo.get(path) {
            return hit;
        }

        let mut visited = vec![path.to_string()];
        let mut current = path;
        let result = loop {
            let parent = dirname(current);
            if is_root(parent) || parent == current {
                break false;
            }
            if let Some(&hit) = self.memo.get(parent) {
                break hit;
            }
            visited.push(parent.to_string());
            current = parent;
        };

        for p in visited {
            self.memo.insert(p, result);
        }
        result
    }

    /// Caller predicate AND path inclusion.
    ///
    /// With no requested paths only the predicate applies.
    pub fn matches(&mut self, path: &str, meta: &EntryMetadata) -> bool {
        let path = strip_trailing_slashes(path);
        if let Some(caller) = &self.caller {
            if !caller(path, meta) {
                return false;
            }
        }
        self.all_paths || self.included(path)
    }
}

impl std::fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathFilter")
            .field("memo", &self.memo)
            .field("all_paths", &self.all_paths)
            .field("caller", &self.caller.is_some())
            .finish()
    }
}

fn strip_trailing_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

fn is_root(path: &str) -> bool {
    path == "/" || path == "." || path.is_empty()
}

/// Parent directory: `.` for a bare name, `/` for a top-level absolute path.
fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        None => ".",
        Some(0) => "/",
        Some(i) => strip_trailing_slashes(&path[..i]),
    }
}
