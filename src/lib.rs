//! # LoweCLI
//!
//! A terminal assistant for developers. It chats about error messages with
//! conversational memory, answers programming questions, suggests shell
//! commands from your shell history, and answers questions from a JSON
//! knowledge base through retrieval-augmented generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │   input   │──▶│ session  │──▶│   commands   │
//! │ rustyline │   │   loop   │   │   dispatch   │
//! └───────────┘   └──────────┘   └──────┬───────┘
//!                                       │
//!           ┌──────────────┬────────────┼──────────────┐
//!           ▼              ▼            ▼              ▼
//!      ┌────────┐    ┌─────────┐   ┌─────────┐   ┌──────────┐
//!      │ memory │    │  model  │   │ answer  │◀──│  index   │◀── ingest
//!      └────────┘    └─────────┘   └─────────┘   │ (SQLite) │    (loader,
//!                                                └──────────┘     chunk,
//!                                                                 embedding)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`console`] | Terminal rendering |
//! | [`input`] | Multi-line input state machine |
//! | [`session`] | Interactive loop |
//! | [`commands`] | Command parsing and dispatch |
//! | [`memory`] | Per-session conversation history |
//! | [`model`] | Chat model gateway (Gemini, OpenAI, Ollama) |
//! | [`prompts`] | System prompts and templates |
//! | [`answer`] | Retrieval-generation pipeline |
//! | [`history`] | Shell history reader |
//! | [`ingest`] | Indexing pipeline |
//! | [`loader`] | Knowledge-base fetching |
//! | [`chunk`] | Recursive JSON chunking |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | Vector index (SQLite, in-memory) |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Index schema |
//! | [`progress`] | Indexing progress on stderr |
//! | [`logging`] | `tracing` setup |
//! | [`error`] | Typed contract errors |
//! | [`models`] | Shared data types |

pub mod answer;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod console;
pub mod db;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod ingest;
pub mod input;
pub mod loader;
pub mod logging;
pub mod memory;
pub mod migrate;
pub mod model;
pub mod models;
pub mod progress;
pub mod prompts;
pub mod session;
