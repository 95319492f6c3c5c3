//! In-memory report store, bounded with least-recently-used eviction.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ReportError;
use crate::extractor::{Extracted, ExtractionSource};

/// Extracted text of one uploaded document.
#[derive(Debug, Clone)]
pub struct Report {
    pub id: String,
    pub text: String,
    pub source: ExtractionSource,
    pub uploaded_at: DateTime<Utc>,
}

impl Report {
    pub fn new(id: impl Into<String>, extracted: Extracted) -> Self {
        Self {
            id: id.into(),
            text: extracted.text,
            source: extracted.source,
            uploaded_at: Utc::now(),
        }
    }
}

/// Listing entry; carries no report text.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub report_id: String,
    pub characters: usize,
    pub source: ExtractionSource,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            report_id: report.id.clone(),
            characters: report.text.chars().count(),
            source: report.source,
            uploaded_at: report.uploaded_at,
        }
    }
}

/// Report store shared by all handlers.
///
/// Writes to an existing id replace the entry outright (last write wins).
/// The lock is only held for map operations.
#[derive(Clone)]
pub struct ReportStore {
    inner: Arc<Mutex<LruCache<String, Report>>>,
}

impl ReportStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Store a report, returning the entry it replaced under the same id.
    pub fn put(&self, report: Report) -> Option<Report> {
        let id = report.id.clone();
        let chars = report.text.chars().count();
        let mut reports = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let displaced = reports.push(id.clone(), report);
        debug!("ReportStore: stored '{}' ({} chars)", id, chars);

        match displaced {
            Some((old_id, old)) if old_id == id => Some(old),
            Some((evicted, _)) => {
                info!("ReportStore: capacity reached, evicted '{}'", evicted);
                None
            }
            None => None,
        }
    }

    /// Fetch a report by id, marking it as recently used.
    pub fn get(&self, id: &str) -> Result<Report, ReportError> {
        let mut reports = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        reports
            .get(id)
            .cloned()
            .ok_or_else(|| ReportError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        let reports = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        reports.contains(id)
    }

    /// Summaries ordered from most to least recently used.
    pub fn list(&self) -> Vec<ReportSummary> {
        let reports = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        reports.iter().map(|(_, report)| ReportSummary::from(report)).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
