//! Kursadmin - business administration service for KKS AS
//!
//! This library provides the core functionality for the KKS back-office,
//! including course and credential records, company license management,
//! product license validation, and the admin API handlers.

pub mod config;
pub mod crypto;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod licensing;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod rate_limit;
pub mod totp;
pub mod util;
pub mod validity;
