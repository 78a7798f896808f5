//! # Pressroom
//!
//! A crash-safe, file-backed publishing core for generated content.
//!
//! Pressroom accepts candidate documents from an upstream generator,
//! validates them, deduplicates them by topic, and commits them to a
//! plain-directory store: one JSON file per document, a derived listing
//! index, and a deduplication ledger. Every write is atomic and every
//! index mutation happens under a cross-process lock, so an interrupted
//! publish never leaves a torn file and the index can always be rebuilt
//! from the documents on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐    ┌────────────────────────────┐    ┌─────────────┐
//! │ Candidate │───▶│         Publisher           │───▶│ documents/  │
//! │  (JSON)   │    │ gate ▶ ledger ▶ store ▶ idx │    │ index.json  │
//! └───────────┘    └──────────────┬─────────────┘    │ ledger.json │
//!                                 │                   └─────────────┘
//!                     ┌───────────┤
//!                     ▼           ▼
//!               ┌──────────┐ ┌──────────┐
//!               │ metrics  │ │  cache   │
//!               │ (capped) │ │ notifier │
//!               └──────────┘ └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! press init                          # create the store layout
//! press publish candidate.json       # validate, dedup, and commit
//! press list                          # what the index currently lists
//! press rebuild                       # rederive the index from disk
//! press check                         # read-only integrity report
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and content hashing |
//! | [`atomic`] | Write-verify-rename file commits |
//! | [`lock`] | Cross-process index lock with stale reclamation |
//! | [`store`] | One-file-per-slug document store |
//! | [`index`] | Derived, bounded listing index |
//! | [`ledger`] | Topic deduplication with reserve/commit/abort |
//! | [`gate`] | Pluggable validation rules |
//! | [`publish`] | The composed publish operation |
//! | [`rebuild`] | Index and ledger recovery from the corpus |
//! | [`metrics`] | Bounded outcome recording |
//! | [`notify`] | Cache invalidation providers |

pub mod atomic;
pub mod check;
pub mod config;
pub mod error;
pub mod gate;
pub mod get;
pub mod index;
pub mod init;
pub mod ledger;
pub mod list;
pub mod lock;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod publish;
pub mod rebuild;
pub mod stats;
pub mod store;
