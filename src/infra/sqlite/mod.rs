// SQLite storage - the production implementation of the shop and account stores

mod sqlite_store;

pub use sqlite_store::SqliteStore;
