//! Halftone gallery sharing backend
//!
//! This library provides the core of the halftone service: the time-windowed
//! gallery sharing lifecycle, the durable job store and Redis work queue that
//! drive scheduled cleanup, and the access gate guarding client routes.

pub mod app_state;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
