// Copyright 2026 Featurescope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Featurescope runtime library: compatibility intelligence for web UIs.
//!
//! Crawls a site (or reads a source tree), detects which modern web platform
//! features it uses, scores each one for browser-support risk and rolls the
//! results up into per-UI compliance reports with an append-only history.

#![allow(clippy::new_without_default)]

pub mod acquisition;
pub mod catalog;
pub mod cli;
pub mod compliance;
pub mod config;
pub mod crawler;
pub mod detect;
pub mod engine;
pub mod error;
pub mod events;
pub mod renderer;
pub mod rest;
pub mod risk;

pub use config::{CrawlOptions, EngineConfig};
pub use engine::{Engine, ScanSource, ScanTarget};
pub use error::{EngineError, EngineResult};
