//! # Clearview
//!
//! Document risk analysis for a general audience.
//!
//! Clearview takes a URL, a local file, or pasted text, extracts readable
//! content, and runs independent language-model assessments over it
//! (summary, scam likelihood, subjectivity, bias). The results become a PDF
//! report; the content can also be narrated to MP3. Both artifacts are kept
//! in SQLite and can be fetched again by id.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │  Input    │──▶│ Extractor │─┬▶│ Orchestrator │──▶│  Report  │──┐
//! │ URL/File/ │   │           │ │ │ (4 aspects)  │   │  (PDF)   │  │  ┌────────┐
//! │  Text     │   └───────────┘ │ └──────────────┘   └──────────┘  ├─▶│ SQLite │
//! └───────────┘                 └▶ Speech (primary → fallback) ────┘  └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! clearview init
//! clearview report https://example.com/article
//! clearview narrate notes.md --voice 21m00Tcm4TlvDq8ikWAM
//! clearview serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`classify`] | URL / file / text input classification |
//! | [`extract`] | Content extraction (scraper, file reader) |
//! | [`verdict`] | Strict `LABEL: YES/NO` response grammar |
//! | [`retry`] | Shared bounded retry policy |
//! | [`generation`] | Text-generation collaborator (OpenAI) |
//! | [`prompts`] | Per-aspect prompts and schemas |
//! | [`analysis`] | Concurrent aspect orchestration |
//! | [`report`] | Report composition and PDF layout |
//! | [`speech`] | Speech synthesis with provider fallback |
//! | [`store`] | Record persistence |
//! | [`pipeline`] | End-to-end request flows |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analysis;
pub mod classify;
pub mod config;
pub mod db;
pub mod extract;
pub mod generation;
pub mod get;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod produce;
pub mod prompts;
pub mod report;
pub mod retry;
pub mod server;
pub mod speech;
pub mod store;
pub mod verdict;
