pub mod manager;
pub mod models;
pub mod repository;

pub use manager::{ConnectionSettings, DatabaseError};
pub use models::Receipt;
pub use repository::{PgReceiptStore, ReceiptStore};
