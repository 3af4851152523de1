pub mod auth;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod users;
