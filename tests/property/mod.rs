//! Property-based tests for tree invariants

mod healing;
mod tree_invariants;
