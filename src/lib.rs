//! # ragops
//!
//! A minimal retrieval-augmented generation service.
//!
//! Uploads are stored in an S3-compatible object store and indexed in a
//! vector store; questions are answered by a chat model using the closest
//! documents as context, and each answer is recorded in an audit log.
//!
//! ## Architecture
//!
//! ```text
//!   POST /upload                          POST /query
//!        │                                     │
//!        ▼                                     ▼
//! ┌──────────────┐                     ┌──────────────┐
//! │   ingest     │                     │   answer     │
//! └──┬────────┬──┘                     └──┬───┬────┬──┘
//!    │        │                           │   │    │
//!    ▼        ▼                           │   ▼    ▼
//! ┌──────┐ ┌────────┐◀────────────────────┘ ┌──────┐ ┌───────┐
//! │MinIO │ │ Chroma │  top-k retrieval      │Ollama│ │SQLite │
//! └──────┘ └────────┘                       └──────┘ │audit  │
//!                                                    └───────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline failure taxonomy |
//! | [`traits`] | Collaborator seams |
//! | [`object_store`] | S3/MinIO client (SigV4) |
//! | [`vector_index`] | Chroma client |
//! | [`embedding`] | Ollama embeddings for the index client |
//! | [`generation`] | Ollama chat client |
//! | [`audit`] | SQLite audit log |
//! | [`memory`] | In-memory collaborators |
//! | [`prompt`] | Prompt assembly |
//! | [`pipeline`] | Ingestion and query orchestration |
//! | [`server`] | HTTP API |
//! | [`proxy`] | Frontend proxy |
//! | [`commands`] | CLI commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod audit;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod object_store;
pub mod pipeline;
pub mod prompt;
pub mod proxy;
pub mod server;
pub mod traits;
pub mod vector_index;
