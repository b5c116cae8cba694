// The infra module contains implementations of core traits.
// Each storage engine goes in its own submodule.

#[path = "in_memory/mod.rs"]
pub mod in_memory;

#[path = "sqlite/mod.rs"]
pub mod sqlite;
