//! `snow` command-line client and MCP tool server for ServiceNow instances.
//!
//! The binary is a thin shell over [`commands::dispatch`]; the same
//! operations back the tools in [`mcp`].

pub mod audit;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod output;
pub mod styles;
