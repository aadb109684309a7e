// Library exports for vidshare
// The binary and the integration tests build on these modules

pub mod assets;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod pagination;
pub mod pipeline;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;
