//! # Research Desk
//!
//! Document ingestion and catalog synchronization for a research library.
//!
//! The upload side validates selected files, turns the accepted ones into
//! catalog records and drives each through a simulated processing lifecycle
//! (`uploading` → `processing` → `completed`), persisting every step. The
//! library side never talks to the upload side directly: it polls the same
//! persistent catalog, picks up changes made by the other context, and
//! layers search, type filtering, sorting and pagination on top.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Validation │──▶│ UploadContext │──▶│  Catalog  │
//! │    gate    │   │  (tickers)    │   │ (storage) │
//! └────────────┘   └──────────────┘   └─────┬─────┘
//!                                           │ poll
//!                                     ┌─────▼──────┐
//!                                     │ CatalogSync │──▶ run_query
//!                                     └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! desk init                             # create the catalog database
//! desk upload ./papers --tags "ml, nlp" # validate and ingest files
//! desk library --search deep --sort name
//! desk serve                            # HTTP JSON server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`validate`] | Validation gate |
//! | [`catalog`] | Shared persistent catalog over pluggable storage |
//! | [`backend`] | Ingestion backend strategy |
//! | [`ingest`] | Upload context: ingestion queue manager |
//! | [`notify`] | Upload toasts |
//! | [`sync`] | Catalog synchronizer |
//! | [`library`] | Library context and query engine |
//! | [`server`] | HTTP JSON server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backend;
pub mod catalog;
pub mod config;
pub mod db;
pub mod ingest;
pub mod library;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod server;
pub mod sync;
pub mod validate;
