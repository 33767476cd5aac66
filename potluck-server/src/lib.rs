pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod drafts;
pub mod errors;
pub mod models;
pub mod publish;
pub mod routes;
pub mod storage;
