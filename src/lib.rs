pub mod api_client;
pub mod api_types;
pub mod auth;
pub mod auth_api;
pub mod config;
pub mod dashboard;
pub mod deployments;
pub mod error;
pub mod format;
pub mod mock_api;
pub mod models;
pub mod pipelines;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;
