// Copyright 2026 Featurescope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Engine event bus: typed progress events from every component.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`EngineEvent`] values. Any consumer (CLI progress output, REST clients,
//! log files) can subscribe independently. When no subscribers exist, events
//! are silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the engine emits. Serialized to JSON for streaming consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    // ── Catalog Events ────────────────────
    /// A refresh replaced the catalog snapshot.
    CatalogRefreshed {
        version: u64,
        features: usize,
        elapsed_ms: u64,
    },
    /// A refresh failed; the previous snapshot (if any) keeps serving.
    CatalogStale {
        reason: String,
        serving_version: Option<u64>,
    },

    // ── Scan Events ───────────────────────
    /// A scan for a UI has started.
    ScanStarted { ui_name: String, target: String },
    /// A page was fetched and extracted.
    PageCrawled {
        ui_name: String,
        url: String,
        depth: u32,
        css_blocks: usize,
        script_blocks: usize,
    },
    /// A page failed and was skipped.
    PageFailed {
        ui_name: String,
        url: String,
        error: String,
    },
    /// A scan finished and its report was persisted.
    ScanCompleted {
        ui_name: String,
        report_id: String,
        compliance_score: f64,
        features: usize,
        high_risk: usize,
        elapsed_ms: u64,
    },
    /// A scan ended without a report (cancelled, timed out or failed); nothing was persisted.
    ScanAborted { ui_name: String, reason: String },
}

/// The central event bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Check if an event belongs to a specific UI's scan.
pub fn event_matches_ui(event: &EngineEvent, ui: &str) -> bool {
    match event {
        EngineEvent::ScanStarted { ui_name, .. }
        | EngineEvent::PageCrawled { ui_name, .. }
        | EngineEvent::PageFailed { ui_name, .. }
        | EngineEvent::ScanCompleted { ui_name, .. }
        | EngineEvent::ScanAborted { ui_name, .. } => ui_name == ui,
        // Catalog events are shared by every scan
        EngineEvent::CatalogRefreshed { .. } | EngineEvent::CatalogStale { .. } => true,
    }
}
