//! Hierarchical service tree: dotted method paths resolved through nested
//! subservice nodes down to a leaf method entry.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Where a registered method's implementation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Hosted directly by the daemon (e.g. `bbus.bbusd.echo`).
    Builtin,
    /// Hosted by a connected service provider, identified by connection id.
    Remote(u64),
}

/// A leaf method's registration details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    /// Who serves calls to this method.
    pub provider: Provider,
    /// Argument type description string.
    pub argdescr: String,
    /// Return type description string.
    pub retdescr: String,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    method: Option<MethodEntry>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.method.is_none()
    }
}

/// The daemon's method registry: a tree of dotted path segments.
#[derive(Debug, Default)]
pub struct ServiceTree {
    root: Node,
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return Err(Error::InvalArg);
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::InvalArg);
    }
    Ok(segments)
}

impl ServiceTree {
    /// Build an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method at `path`.
    ///
    /// All-or-nothing: if any prefix of `path` is already a leaf method (so
    /// it cannot also hold children), or `path` itself is already
    /// registered, nothing is mutated and an error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalArg`] if `path` is empty or contains an empty segment.
    /// - [`Error::MRegErr`] if `path` conflicts with an existing
    ///   registration.
    pub fn insert(&mut self, path: &str, entry: MethodEntry) -> Result<()> {
        let segments = split_path(path)?;

        // Validate the whole path before mutating anything, so a conflict
        // partway through never leaves a half-built subservice chain.
        {
            let mut node = &self.root;
            for (i, seg) in segments.iter().enumerate() {
                let Some(child) = node.children.get(*seg) else { break };
                let is_last = i == segments.len() - 1;
                if is_last && (child.method.is_some() || !child.children.is_empty()) {
                    // The terminal name already exists, either as a method or
                    // as a subservice: a name may not be both.
                    return Err(Error::MRegErr);
                }
                if !is_last && child.method.is_some() && child.children.is_empty() {
                    // A leaf being asked to grow children it never had.
                    return Err(Error::MRegErr);
                }
                node = child;
            }
        }

        let mut node = &mut self.root;
        for seg in &segments {
            node = node.children.entry((*seg).to_string()).or_default();
        }
        if node.method.is_some() {
            return Err(Error::MRegErr);
        }
        node.method = Some(entry);
        Ok(())
    }

    /// Resolve `path` to its registered method entry, if any.
    #[must_use]
    pub fn locate(&self, path: &str) -> Option<&MethodEntry> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        let mut node = &self.root;
        for seg in &segments {
            node = node.children.get(*seg)?;
        }
        node.method.as_ref()
    }

    /// Remove every method owned by `provider`, pruning any subservice node
    /// left with neither children nor a method of its own.
    ///
    /// Returns the set of paths that were removed.
    pub fn remove_provider(&mut self, provider: Provider) -> Vec<String> {
        let mut removed = Vec::new();
        remove_provider_rec(&mut self.root, provider, &mut String::new(), &mut removed);
        removed
    }

    /// Remove a single registration by its exact path, regardless of
    /// provider. Used by explicit unregistration.
    ///
    /// Returns `true` if a method was removed.
    pub fn remove_path(&mut self, path: &str) -> bool {
        let Ok(segments) = split_path(path) else { return false };
        remove_path_rec(&mut self.root, &segments)
    }
}

fn remove_provider_rec(node: &mut Node, provider: Provider, prefix: &mut String, removed: &mut Vec<String>) {
    let mut dead_children = Vec::new();
    for (seg, child) in &mut node.children {
        let depth = prefix.len();
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(seg);

        remove_provider_rec(child, provider, prefix, removed);

        prefix.truncate(depth);
        if child.is_empty() {
            dead_children.push(seg.clone());
        }
    }
    for seg in dead_children {
        node.children.remove(&seg);
    }

    if let Some(entry) = &node.method {
        if entry.provider == provider {
            removed.push(prefix.clone());
            node.method = None;
        }
    }
}

fn remove_path_rec(node: &mut Node, segments: &[&str]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        let had = node.method.is_some();
        node.method = None;
        return had;
    };
    let Some(child) = node.children.get_mut(*head) else { return false };
    let removed = remove_path_rec(child, rest);
    if child.is_empty() {
        node.children.remove(*head);
    }
    removed
}
