//! Ragline Library
//!
//! This library provides the core functionality of the ragline query
//! orchestration engine: context retrieval, prompt assembly, multi-model
//! fallback generation, and operational metrics. It is used by both the
//! main binary and integration tests.

/// Configuration management module
pub mod config;

/// Operational metrics registry
pub mod metrics;

/// Context retrieval and vector search
pub mod retrieval;

/// Embedding provider abstraction
pub mod embedding;

/// Prompt template loading and message assembly
pub mod prompt;

/// LLM provider abstraction and fallback gateway
pub mod llm;

/// Response cache
pub mod cache;

/// Query orchestration pipeline
pub mod orchestrator;

/// Telemetry and observability
pub mod telemetry;

/// CLI interface module
pub mod cli;
