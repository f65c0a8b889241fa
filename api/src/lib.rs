pub mod credentials;
pub mod routes;
pub mod vision;

pub use routes::{router, AppState};
