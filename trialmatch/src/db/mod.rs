mod backend;
mod connection;
pub mod repository;
pub(crate) mod schema;
pub mod traits;

pub use backend::LibSqlBackend;
pub use connection::Database;
pub use traits::*;
