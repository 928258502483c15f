//! Issueflow Core
//!
//! Foundational types for the issueflow workspace. This crate has zero
//! dependencies on application-level code (storage, HTTP, model providers).
//!
//! ## Module Organization
//!
//! - `streaming` - Turn stream event types and the adapter trait
//! - `message` - Conversation message/part model shared across the workspace
//!
//! ## Design Principles
//!
//! 1. **Minimal dependencies (serde only)** - keeps build times low
//! 2. **Unidirectional dependency** - this crate depends on nothing else in
//!    the workspace

pub mod message;
pub mod streaming;

// ── Conversation Model ─────────────────────────────────────────────────
pub use message::{ChatMessage, ChatRole, MessagePart};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, TurnEvent};
