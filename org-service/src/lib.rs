//! org-service: multi-tenant organization unit hierarchy management.
pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
