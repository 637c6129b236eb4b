pub mod database;
pub mod directory;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod sessions;

pub use database::Database;
pub use directory::{DirectoryConfig, SessionDirectory, SessionStore};
pub use error::StoreError;
pub use sessions::SessionRepo;
