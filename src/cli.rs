//! CLI interface for ragline
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ragline query orchestration engine
///
/// Answers natural-language questions by retrieving context from a vector
/// index and invoking a chat-completion provider with multi-model fallback.
#[derive(Parser, Debug)]
#[command(name = "ragline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a question against a RAG index
    Ask {
        /// The question to answer
        question: String,

        /// RAG whose index should be searched
        #[arg(short, long, default_value = "default")]
        rag: String,

        /// Number of context chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity score for a chunk to be used
        #[arg(long)]
        score_threshold: Option<f32>,

        /// Session identifier (generated if absent)
        #[arg(long)]
        session: Option<String>,

        /// Print the metrics snapshot after answering
        #[arg(long)]
        show_metrics: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init,

    /// Validate the configuration file
    Validate,

    /// Print the effective configuration
    Show,
}
