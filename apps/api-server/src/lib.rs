pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod grpc;
pub mod routes;
pub mod state;
pub mod test_support;
pub mod validate;
