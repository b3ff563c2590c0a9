//! Agent Runtime - the conversational boundary around the lapwise core
//!
//! This crate turns free-text chat turns into the structured signals the core
//! state machine understands, and renders the core's decisions back into text:
//! - Interprets user replies (keyword rules, or an LLM with keyword fallback)
//! - Grounds recommendations through an HTTP search endpoint with retry/backoff
//! - Renders questions, summaries, recommendations and comparisons
//!
//! # Architecture
//!
//! One user message is handled per turn:
//! 1. **Interpretation** (`conversation`) - free text → `UserIntent`
//! 2. **Routing** (`runtime`) - answer, compare or modify against the `Session`
//! 3. **Rendering** (`render`) - core results → user-facing text
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It NEVER decides which field is asked next,
//! when a field is given up on, or which laptops are recommended. Those are
//! deterministic decisions made by the core.

pub mod conversation;
pub mod llm;
pub mod render;
pub mod runtime;
pub mod search;
