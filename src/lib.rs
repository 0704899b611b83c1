//! mcp-duet: an MCP client over WebSocket and HTTP+SSE
//!
//! This library provides the session/transport layer, the Gemini backend,
//! and the tool-orchestration loop used by the `mcp-duet` CLI.

pub mod agent;
pub mod cli;
pub mod config;
pub mod constants;
pub mod llm;
pub mod mcp;
