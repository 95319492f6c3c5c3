use std::sync::Arc;

use crate::completion::CompletionProvider;
use crate::config::Settings;
use crate::extractor::TextExtractor;
use crate::report_store::ReportStore;
use crate::session::SessionStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub reports: ReportStore,
    pub sessions: SessionStore,
    pub extractor: Arc<TextExtractor>,
    pub completion: Arc<dyn CompletionProvider>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        extractor: TextExtractor,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            reports: ReportStore::new(settings.report_store_capacity),
            sessions: SessionStore::new(settings.session_capacity),
            settings: Arc::new(settings),
            extractor: Arc::new(extractor),
            completion,
        }
    }
}
