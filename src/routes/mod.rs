pub mod banner;
pub mod health;
pub mod modules;
pub mod profile;
pub mod roles;
pub mod users;
