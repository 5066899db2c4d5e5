pub mod connection;
pub mod user_context;

pub use connection::*;
pub use user_context::{UserContextRecord, UserContextStore};
