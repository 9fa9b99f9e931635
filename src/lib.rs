//! Natural-language to SQL generation behind a read-only safety gate.
//!
//! Generation tries an AI provider first and falls back to a deterministic
//! keyword pattern catalog. Validation gates every statement lexically, then
//! dry-runs it with `EXPLAIN` and executes it under a fixed deadline.

pub mod audit;
pub mod config;
pub mod context;
pub mod db;
pub mod generation;
pub mod llm;
pub mod models;
pub mod patterns;
pub mod safety;
pub mod util;
pub mod validation;
pub mod web;
