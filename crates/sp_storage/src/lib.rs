use sp_core::{Error, PostStore, Result};
use std::path::Path;
use std::sync::Arc;

pub mod backends;

pub use backends::*;

/// Opens the store named by `kind` (`sqlite` or `memory`).
pub async fn create_storage(kind: &str, db_path: &Path) -> Result<Arc<dyn PostStore>> {
    match kind {
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SQLiteStorage::new_with_path(db_path).await?)),
        "memory" => {
            tracing::warn!(path = %db_path.display(), "memory storage selected; nothing will persist");
            Ok(Arc::new(MemoryStorage::new()))
        }
        other => Err(Error::Storage(format!("Unsupported storage backend: {}", other))),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::create_storage;
}
