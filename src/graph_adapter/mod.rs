//! Graph write adapter: bulk entity/relationship/embedding writes with
//! optional cache+buffer, over an abstract external graph service
//! contract (spec §4.6 and §6, component C6).

mod adapter;
mod error;
mod memory;
mod traits;

pub use adapter::{GraphAdapterOptions, GraphWriteAdapter};
pub use error::GraphServiceError;
pub use memory::InMemoryGraphService;
pub use traits::{BulkWriteOptions, BulkWriteResult, CreateCheckpointOptions, GraphServiceClient, ItemResult, Result};
