//! # Profile RAG
//!
//! A retrieval-augmented assistant that answers questions about one person
//! using only their structured knowledge file.
//!
//! The knowledge file is rendered into one document per category, split
//! into overlapping chunks, embedded, and stored in a vector index. A
//! question is embedded the same way, the closest chunks are assembled into
//! a bounded context, and a language model answers from that context alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Knowledge │──▶│ Documents ──▶  │──▶│ Vector index │
//! │   JSON    │   │ Chunks+Embed  │   │ SQLite / mem │
//! └───────────┘   └───────────────┘   └──────┬───────┘
//!                                           │
//!          question ──▶ retrieve ◀──────────┘
//!                          │
//!                          ▼
//!                  assemble context ──▶ generate ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! prag init                       # create database
//! prag rebuild                    # chunk + embed the knowledge file
//! prag search "what languages"    # inspect retrieval
//! prag ask "What is your title?"  # answer end to end
//! prag serve                      # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error taxonomy |
//! | [`knowledge`] | Knowledge file schema and rendering |
//! | [`models`] | Core data types |
//! | [`documents`] | One document per knowledge category |
//! | [`chunk`] | Boundary-aware chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Generation provider abstraction |
//! | [`index`] | Vector index generations (memory, SQLite) |
//! | [`retrieve`] | Top-k retrieval with dedup |
//! | [`context`] | Budgeted context assembly |
//! | [`orchestrator`] | Prompt strategies and the generation call |
//! | [`pipeline`] | Atomic rebuilds and the question flow |
//! | [`server`] | HTTP chat API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod generation;
mod http;
pub mod index;
pub mod knowledge;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod retrieve;
pub mod server;
