// crates/redix-mcp/src/lib.rs
// ============================================================================
// Module: Redix MCP
// Description: MCP tool surface for gated Redix engine conversions.
// Purpose: Expose conversion pipelines to agents over JSON-RPC 2.0.
// Dependencies: redix-core, redix-client, redix-config, axum, tokio
// ============================================================================

//! ## Overview
//! This crate wires [`redix_core::ConversionService`] to MCP clients. The
//! [`ToolRouter`] owns the tool catalogue and strict argument decoding; the
//! [`McpServer`] speaks JSON-RPC over stdio or HTTP and always routes calls
//! through the router.
//!
//! Security posture: tool arguments and client headers are untrusted. They
//! are decoded strictly and size-limited before any engine call is made.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod server;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use server::McpServer;
pub use server::McpServerError;
pub use server::rpc_app;
pub use server::serve_io;
pub use tools::ToolDefinition;
pub use tools::ToolError;
pub use tools::ToolName;
pub use tools::ToolRouter;
