// Library for tests to access modules

pub mod command;
pub mod config;
pub mod fetcher;
pub mod models;
pub mod routes;
pub mod scheduler;
pub mod telemetry;
pub mod version;
