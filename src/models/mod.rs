pub mod module;
pub mod role;
pub mod user;
