pub mod config;
pub mod detection;
pub mod error;
pub mod inference;
pub mod routes;
