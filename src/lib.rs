//! Wanderlist - account and favorite-countries service
//!
//! Authenticates visitors of a country catalog and keeps each account's
//! deduplicated set of favorite country codes.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
