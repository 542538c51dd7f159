//! Operator HTTP surface
//!
//! Serves registry inspection, DDL requests, reshard submission and
//! migration control, plus the query endpoints.

mod config;
mod routes;
mod server;

pub use config::HttpServerConfig;
pub use routes::routes;
pub use server::HttpServer;
