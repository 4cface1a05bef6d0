//! # CodeContext
//!
//! Self-hosted code intelligence: upload a repository (git clone or ZIP),
//! index it for semantic search, and ask questions or request edits backed
//! by retrieval-augmented generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌───────────────┐
//! │ Acquisition  │──▶│     Ingestion      │──▶│  Vector store │
//! │ git / zip    │   │ chunk+embed+mirror │   │ JSON per proj │
//! └──────────────┘   └───────────────────┘   └───────┬───────┘
//!                                                    │
//!                               ┌────────────────────┤
//!                               ▼                    ▼
//!                          ┌─────────┐         ┌──────────┐
//!                          │   CLI   │         │   HTTP   │
//!                          │(codectx)│         │  (axum)  │
//!                          └─────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! codectx init                          # create database
//! codectx ingest ./my-project           # index a local checkout
//! codectx search 3 "where is auth"      # semantic search over project 3
//! codectx serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`context`] | Process-wide shared state |
//! | [`repo`] | Repository acquisition (git clone, ZIP) |
//! | [`discovery`] | Source file discovery and filtering |
//! | [`chunk`] | Code chunking strategies |
//! | [`embedding`] | Local embedding model |
//! | [`vector_store`] | Per-project vector collections |
//! | [`retrieval`] | Top-K retrieval and context assembly |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`llm`] | Generation providers and prompts |
//! | [`patch`] | Unified diff rendering |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod discovery;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod patch;
pub mod repo;
pub mod retrieval;
pub mod server;
pub mod vector_store;
