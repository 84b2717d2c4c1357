//! Cycle Guard
//!
//! Decides whether assigning `candidate_parent_id` as the parent of `node_id`
//! would make the ancestry chain loop. Ancestry is always resolved through
//! by-id lookups of `parent_id`, never through cached object references.
//!
//! The guard itself never fails: a `true` result is translated by callers into
//! a rejected mutation. Only the store-backed variant can return an error, and
//! only when a lookup fails at the storage layer.

use crate::db::{DatabaseError, NodeStore};
use crate::models::OrderedNode;
use std::collections::HashSet;

/// Walk up from `candidate_parent_id` and report whether the chain reaches
/// `node_id` (the candidate is a descendant) or revisits a node (a cycle that
/// already exists in the data).
///
/// `ancestor_lookup` returns the parent id of a node, or `None` for a root or
/// an unknown id. An unknown id terminates the chain.
///
/// # Examples
///
/// ```
/// use planboard_core::ordering::would_create_cycle;
/// use std::collections::HashMap;
///
/// // a is the parent of b, b is the parent of c
/// let parents = HashMap::from([("b", "a"), ("c", "b")]);
/// let lookup = |id: &str| parents.get(id).map(|p| p.to_string());
///
/// assert!(would_create_cycle("c", "a", lookup));
/// assert!(!would_create_cycle("a", "c", lookup));
/// ```
pub fn would_create_cycle<F>(candidate_parent_id: &str, node_id: &str, mut ancestor_lookup: F) -> bool
where
    F: FnMut(&str) -> Option<String>,
{
    if candidate_parent_id == node_id {
        return true;
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut current = candidate_parent_id.to_string();

    loop {
        if current == node_id {
            return true;
        }
        if !visited.insert(current.clone()) {
            tracing::warn!(
                "Existing ancestry cycle detected at node '{}' while checking parent for '{}'",
                current,
                node_id
            );
            return true;
        }
        match ancestor_lookup(&current) {
            Some(parent_id) => current = parent_id,
            None => return false,
        }
    }
}

/// Store-backed variant of [`would_create_cycle`].
///
/// Each step is one `find_by_id` round trip.
pub async fn would_create_cycle_in_store<S>(
    store: &S,
    candidate_parent_id: &str,
    node_id: &str,
) -> Result<bool, DatabaseError>
where
    S: NodeStore + ?Sized,
{
    Ok(walk_ancestors_in_store(store, candidate_parent_id, node_id)
        .await?
        .creates_cycle)
}

/// Result of walking up from a prospective parent
#[derive(Debug, Clone, Default)]
pub struct AncestorWalk {
    /// The chain reached the moving node or revisited a node
    pub creates_cycle: bool,

    /// Rows read on the way up, starting with the candidate parent
    ///
    /// A reparent that commits only while all of these still carry the same
    /// version cannot race another reparent into a loop.
    pub visited: Vec<OrderedNode>,
}

/// Walk the ancestry of `candidate_parent_id` in the store, keeping every
/// row read so the caller can version-check them at commit time
pub async fn walk_ancestors_in_store<S>(
    store: &S,
    candidate_parent_id: &str,
    node_id: &str,
) -> Result<AncestorWalk, DatabaseError>
where
    S: NodeStore + ?Sized,
{
    let mut walk = AncestorWalk::default();
    if candidate_parent_id == node_id {
        walk.creates_cycle = true;
        return Ok(walk);
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut current = candidate_parent_id.to_string();

    loop {
        if current == node_id {
            walk.creates_cycle = true;
            return Ok(walk);
        }
        if !seen.insert(current.clone()) {
            tracing::warn!(
                "Existing ancestry cycle detected at node '{}' while checking parent for '{}'",
                current,
                node_id
            );
            walk.creates_cycle = true;
            return Ok(walk);
        }
        let Some(node) = store.find_by_id(&current).await? else {
            return Ok(walk);
        };
        let parent_id = node.parent_id.clone();
        walk.visited.push(node);
        match parent_id {
            Some(parent_id) => current = parent_id,
            None => return Ok(walk),
        }
    }
}
