//! Append-only scan history.
//!
//! Reports are immutable once written. [`SqliteHistory`] keeps them in a
//! single `scans` table with the full report as JSON next to the columns
//! queries filter on; [`MemoryHistory`] backs tests and throwaway runs.

use super::ScanReport;
use crate::error::{EngineError, EngineResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Durable per-UI log of scan reports.
pub trait HistoryStore: Send + Sync {
    /// Append one report. Never overwrites.
    fn append(&self, report: &ScanReport) -> EngineResult<()>;
    /// Reports for one UI in insertion order; with `limit`, only the most
    /// recent `limit` of them (still oldest first).
    fn history(&self, ui_name: &str, limit: Option<usize>) -> EngineResult<Vec<ScanReport>>;
    /// The most recent report of every UI, ordered by UI name.
    fn latest_per_ui(&self) -> EngineResult<Vec<ScanReport>>;
    /// One report by id.
    fn get(&self, report_id: &str) -> EngineResult<ScanReport>;
}

fn lock_err<T>(_: T) -> EngineError {
    EngineError::Storage("history lock poisoned".into())
}

/// SQLite-backed history.
pub struct SqliteHistory {
    db: Mutex<Connection>,
}

impl SqliteHistory {
    /// Open or create the history database at `path`.
    pub fn open(path: &Path) -> EngineResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;
        Self::init(db)
    }

    /// History that lives only as long as the process.
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> EngineResult<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS scans (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                ui_name TEXT NOT NULL,
                scanned_at TEXT NOT NULL,
                compliance_score REAL NOT NULL,
                report TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS scans_ui ON scans (ui_name, seq);",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn decode(rows: Vec<String>) -> EngineResult<Vec<ScanReport>> {
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(EngineError::from))
            .collect()
    }
}

impl HistoryStore for SqliteHistory {
    fn append(&self, report: &ScanReport) -> EngineResult<()> {
        let json = serde_json::to_string(report)?;
        let db = self.db.lock().map_err(lock_err)?;
        db.execute(
            "INSERT INTO scans (id, ui_name, scanned_at, compliance_score, report)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.id,
                report.ui_name,
                report.scanned_at.to_rfc3339(),
                report.compliance_score,
                json
            ],
        )?;
        Ok(())
    }

    fn history(&self, ui_name: &str, limit: Option<usize>) -> EngineResult<Vec<ScanReport>> {
        let db = self.db.lock().map_err(lock_err)?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = db.prepare(
            "SELECT report FROM (
                SELECT seq, report FROM scans WHERE ui_name = ?1 ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![ui_name, limit], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Self::decode(rows)
    }

    fn latest_per_ui(&self) -> EngineResult<Vec<ScanReport>> {
        let db = self.db.lock().map_err(lock_err)?;
        let mut stmt = db.prepare(
            "SELECT report FROM scans
             WHERE seq IN (SELECT MAX(seq) FROM scans GROUP BY ui_name)
             ORDER BY ui_name",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Self::decode(rows)
    }

    fn get(&self, report_id: &str) -> EngineResult<ScanReport> {
        let db = self.db.lock().map_err(lock_err)?;
        let json: Option<String> = db
            .query_row(
                "SELECT report FROM scans WHERE id = ?1",
                params![report_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(EngineError::not_found(format!("report '{report_id}'"))),
        }
    }
}

/// In-process history.
#[derive(Default)]
pub struct MemoryHistory {
    reports: Mutex<Vec<ScanReport>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&self, report: &ScanReport) -> EngineResult<()> {
        let mut reports = self.reports.lock().map_err(lock_err)?;
        if reports.iter().any(|r| r.id == report.id) {
            return Err(EngineError::Storage(format!("report '{}' already recorded", report.id)));
        }
        reports.push(report.clone());
        Ok(())
    }

    fn history(&self, ui_name: &str, limit: Option<usize>) -> EngineResult<Vec<ScanReport>> {
        let reports = self.reports.lock().map_err(lock_err)?;
        let matching: Vec<ScanReport> = reports
            .iter()
            .filter(|r| r.ui_name == ui_name)
            .cloned()
            .collect();
        let skip = limit.map(|l| matching.len().saturating_sub(l)).unwrap_or(0);
        Ok(matching.into_iter().skip(skip).collect())
    }

    fn latest_per_ui(&self) -> EngineResult<Vec<ScanReport>> {
        let reports = self.reports.lock().map_err(lock_err)?;
        let mut latest: std::collections::BTreeMap<&str, &ScanReport> = Default::default();
        for report in reports.iter() {
            latest.insert(report.ui_name.as_str(), report);
        }
        Ok(latest.into_values().cloned().collect())
    }

    fn get(&self, report_id: &str) -> EngineResult<ScanReport> {
        let reports = self.reports.lock().map_err(lock_err)?;
        reports
            .iter()
            .find(|r| r.id == report_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("report '{report_id}'")))
    }
}
