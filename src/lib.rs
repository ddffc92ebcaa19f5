pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod ratelimit;
pub mod repository;
pub mod routes;
pub mod schema;
pub mod service;
pub mod state;
pub mod utils;
pub mod validation;
