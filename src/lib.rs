//! # Parley
//!
//! A local-first conversational AI client: multi-turn chat sessions
//! augmented with context retrieved from local files (RAG), plus commands
//! invoked by semantic intent instead of memorized syntax.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Files +      │──▶│   Indexer    │──▶│  SQLite    │
//! │ Command      │   │ Chunk+Embed  │   │ content /  │
//! │ Catalog      │   │ (hash-gated) │   │ commands   │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │
//!                    ┌────────────────────────┤
//!                    ▼                        ▼
//!              ┌───────────┐          ┌──────────────┐
//!              │ Resolver  │─────────▶│ Chat          │
//!              │ command / │          │ Orchestrator  │
//!              │ context   │          │ + Session log │
//!              └───────────┘          └──────────────┘
//! ```
//!
//! Every user turn is embedded once and probed against two collections:
//! `commands` (is this a command invocation?) and `content` (what local
//! context should augment the prompt?). The outcome is a [`models::Resolution`]
//! — exactly one of a command invocation or a ranked context bundle.
//!
//! ## Quick Start
//!
//! ```bash
//! parley init                       # create database
//! parley sync                       # index content roots + command catalog
//! parley resolve "summarize this"   # inspect how a turn would resolve
//! parley chat                       # start an interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunker`] | Windowed line chunking |
//! | [`catalog`] | Command catalog with drift hash |
//! | [`embedder`] | Embedding backend adapter |
//! | [`index`] | Vector index client |
//! | [`indexer`] | Hash-gated incremental sync |
//! | [`resolver`] | Command/context turn resolution |
//! | [`session`] | Durable chat turn log |
//! | [`chat`] | Chat orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod catalog;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedder;
pub mod error;
pub mod index;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod resolver;
pub mod session;
