pub mod persistence;
pub mod symbol;
pub mod sync_store;

pub use persistence::{export_store, import_store, read_export, write_atomic, StoreExport};
pub use symbol::{Keys, StoreId, Symbol, SymbolRef};
pub use sync_store::{NativeStore, StoreLock, SyncStore};
