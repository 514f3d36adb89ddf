pub mod alerts;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod rest;
pub mod store;
pub mod validate;
