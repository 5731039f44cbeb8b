//! MCP server for the [Endee](https://endee.io) vector database.
//!
//! `endee-mcp` exposes Endee index, vector, search and backup operations as
//! [MCP](https://modelcontextprotocol.io/) tools, and adds an embedding-aware
//! ingestion pipeline on top: records carrying text instead of vectors are embedded
//! in batches by a remote (OpenAI-compatible) or local (ONNX Runtime) provider before
//! they are upserted.
//!
//! # Architecture
//!
//! - **Storage**: [`storage::EndeeClient`] speaks Endee's HTTP API (JSON and MessagePack)
//!   behind the [`storage::VectorStore`] trait
//! - **Embeddings**: [`embedding::EmbeddingManager`] resolves and caches one provider per
//!   `(kind, model)` and loads each at most once
//! - **Ingestion**: [`records`] normalizes JSON/CSV input, [`ingest`] chunks, embeds and
//!   upserts with per-record failure reporting
//! - **Query**: [`query`] runs dense, text and hybrid search with [`filter`] translation
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP/SSE
//!
//! # Modules
//!
//! - [`config`]: TOML + environment variable configuration
//! - [`error`]: Domain error type with stable error codes
//! - [`tools`]: MCP tool handlers

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod import;
pub mod ingest;
pub mod query;
pub mod records;
pub mod retry;
pub mod server;
pub mod storage;
pub mod tools;
