// crates/redix-config/src/lib.rs
// ============================================================================
// Module: Redix Config Library
// Description: Canonical config model and validation for the gateway.
// Purpose: Single source of truth for redix-mcp.toml semantics.
// Dependencies: redix-client, serde, toml
// ============================================================================

//! ## Overview
//! `redix-config` defines the gateway configuration: how to reach the engine,
//! which MCP transport to serve, and where audit events go. Loading is strict
//! and fail-closed; environment overrides are applied after the file so the
//! API key never has to live on disk.
//!
//! Security posture: config inputs are untrusted and the API key is redacted
//! from `Debug` output.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
