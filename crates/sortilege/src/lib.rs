//! sortilege - HTTP bot server and CLI for Discord voice delivery
//!
//! This library provides:
//! - `api`: request/response bodies and error statuses
//! - `serve`: the axum bot server
//! - `client`: reqwest client for a running server
//! - `commands`: CLI command implementations
//! - `telemetry`: tracing and OpenTelemetry setup

pub mod api;
pub mod client;
pub mod commands;
pub mod serve;
pub mod telemetry;
