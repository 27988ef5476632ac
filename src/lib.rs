pub mod app;
pub mod authz;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod identity;
pub mod models;
pub mod routes;
pub mod upstream;

// Re-export commonly used items for tests
pub use app::create_app;
