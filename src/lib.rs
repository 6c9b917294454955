//! cdec_history: full-history stage and flow retrieval from the California
//! Data Exchange Center (CDEC) JSON servlet.
//!
//! # Module structure
//!
//! ```text
//! cdec_history
//! ├── model       — shared data types (RawReading, Series, DateWindow, FetchError, …)
//! ├── config      — session configuration loader (cdec.toml + env overrides)
//! ├── logging     — tracing subscriber setup
//! ├── ingest
//! │   ├── cdec    — JSONDataServlet: URL construction, JSON parsing, row cleaning
//! │   ├── retry   — opt-in retry wrapper for any Fetcher
//! │   └── fixtures (test only) — representative servlet payloads and fetcher doubles
//! ├── discovery   — earliest-date search (decade anchors, then year-by-year)
//! ├── collect     — chunked range retrieval over a worker pool
//! ├── combine     — stage/flow outer join on timestamp
//! ├── session     — one-station export: discover, collect, combine
//! ├── export      — CSV output written atomically
//! └── analysis
//!     └── yearly  — per-year mean/min/max/percentile summaries
//! ```

pub mod analysis;
pub mod collect;
pub mod combine;
pub mod config;
pub mod discovery;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod session;
