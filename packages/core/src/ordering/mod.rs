//! Ordering Primitives
//!
//! Pure, store-independent building blocks of the ordered hierarchy:
//!
//! - [`rank_allocator`] - append ranks and renumbering with a fixed step
//! - [`cycle_guard`] - ancestry walk rejecting self-parenting and loops
//! - [`move_adapter`] - single-step moves expressed as rank swaps

pub mod cycle_guard;
pub mod move_adapter;
pub mod rank_allocator;

pub use cycle_guard::{
    walk_ancestors_in_store, would_create_cycle, would_create_cycle_in_store, AncestorWalk,
};
pub use move_adapter::{
    canonical_cmp, canonical_sort, move_down, move_up, plan_move, MoveDirection,
};
pub use rank_allocator::{allocate_append_rank, normalize_ranks, RankAllocator, RANK_STEP};
