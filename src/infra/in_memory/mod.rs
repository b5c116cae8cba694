// In-memory storage - used by tests and by the ephemeral `memory` backend

mod in_memory_store;

pub use in_memory_store::InMemoryStore;
