//! Integration Tests Module
//!
//! This module contains integration tests for the issueflow pipeline.
//! Tests cover query classification, the mode registry, the search gateway's
//! fallback behavior, the tool-calling agent loop, and conversation
//! persistence including legacy migration.


// Mode registry CRUD and ownership tests
mod modes_test;

// Search gateway fallback tests
mod search_gateway_test;

// Tool-calling agent loop and streaming tests
mod agent_loop_test;
