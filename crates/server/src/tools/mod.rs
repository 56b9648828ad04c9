//! MCP tool implementations.
//!
//! This module contains all tools exposed by the tidyread server.

pub mod fetch_content;

pub use fetch_content::fetch_content_impl;
