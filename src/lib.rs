//! Interactive authentication endpoint library
//!
//! Provides the flow controller, capability traits, and HTTP transport for
//! the local-credential / federated-login / partial-login-resume / sign-out
//! endpoint.

#![deny(dead_code)]

pub mod capabilities;
pub mod config;
pub mod cookies;
pub mod domain;
pub mod flow;
pub mod view;
pub mod web;

pub use flow::AppState;
