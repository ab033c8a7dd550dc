pub mod memory;
pub mod qdrant;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::traits::VectorStore;
use std::sync::Arc;

/// Build the vector store named by the configuration.
pub fn store_from_config(
    config: &StoreConfig,
    dimensions: usize,
) -> Result<Arc<dyn VectorStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new(dimensions))),
        StoreBackend::Qdrant => Ok(Arc::new(QdrantStore::new(
            &config.url,
            config.collection.clone(),
            config.api_key.clone(),
            dimensions,
        )?)),
    }
}
