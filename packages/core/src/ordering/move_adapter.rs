//! Move Adapter
//!
//! Translates a "move this item up/down by one" gesture into the minimal set
//! of rank assignments for the reorder transaction. Siblings must already be
//! in canonical order (see [`canonical_sort`]).

use crate::models::{OrderedNode, RankUpdate};
use crate::ordering::RankAllocator;
use std::cmp::Ordering;

/// Direction of a single-step move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Canonical comparison: rank ascending, then name, then id
pub fn canonical_cmp(a: &OrderedNode, b: &OrderedNode) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort nodes into the canonical display order
pub fn canonical_sort(nodes: &mut [OrderedNode]) {
    nodes.sort_by(canonical_cmp);
}

/// Updates that move `target_id` one position towards the front.
///
/// Returns `None` if `target_id` is not among `ordered_siblings`, and an empty
/// update set if it is already first.
pub fn move_up(ordered_siblings: &[OrderedNode], target_id: &str) -> Option<Vec<RankUpdate>> {
    plan_move(ordered_siblings, target_id, MoveDirection::Up, RankAllocator::default())
}

/// Updates that move `target_id` one position towards the back.
///
/// Returns `None` if `target_id` is not among `ordered_siblings`, and an empty
/// update set if it is already last.
pub fn move_down(ordered_siblings: &[OrderedNode], target_id: &str) -> Option<Vec<RankUpdate>> {
    plan_move(ordered_siblings, target_id, MoveDirection::Down, RankAllocator::default())
}

/// Shared implementation of [`move_up`] / [`move_down`] with an explicit allocator.
pub fn plan_move(
    ordered_siblings: &[OrderedNode],
    target_id: &str,
    direction: MoveDirection,
    allocator: RankAllocator,
) -> Option<Vec<RankUpdate>> {
    let index = ordered_siblings.iter().position(|n| n.id == target_id)?;

    let neighbour = match direction {
        MoveDirection::Up if index == 0 => return Some(Vec::new()),
        MoveDirection::Up => index - 1,
        MoveDirection::Down if index + 1 >= ordered_siblings.len() => return Some(Vec::new()),
        MoveDirection::Down => index + 1,
    };

    let target = &ordered_siblings[index];
    let other = &ordered_siblings[neighbour];

    if target.rank != other.rank {
        return Some(vec![
            RankUpdate::new(target.id.clone(), other.rank),
            RankUpdate::new(other.id.clone(), target.rank),
        ]);
    }

    // Equal ranks: a swap would not change the canonical order, so renumber
    // the list in its new order and keep only the pairs that change.
    let mut reordered: Vec<&OrderedNode> = ordered_siblings.iter().collect();
    reordered.swap(index, neighbour);

    let updates = allocator
        .normalize_ranks(reordered.iter().map(|n| n.id.clone()))
        .into_iter()
        .zip(reordered.iter())
        .filter(|((_, rank), node)| node.rank != *rank)
        .map(|((id, rank), _)| RankUpdate::new(id, rank))
        .collect();

    Some(updates)
}
