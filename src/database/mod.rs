pub mod link;
pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod store;

pub use link::Link;
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;
pub use repository::{Document, LinkedDocument, Repository, WriteRule};
pub use store::{Collection, DocumentStore};
