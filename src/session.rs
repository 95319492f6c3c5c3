//! Session-accumulating chat: a per-session question/answer history about a
//! single report, replayed on every follow-up question.
//!
//! History is a sliding window; turns older than the window are dropped so
//! prompt size stays bounded no matter how long a session lives.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ReportError;
use crate::prompt::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoReport,
    ReportLoaded,
    AwaitingAnswer,
    AnswerReady,
}

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// What a caller needs to run one session question outside the store lock.
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub report_id: String,
    pub locale: Locale,
    pub history: Vec<Turn>,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: Uuid,
    report_id: Option<String>,
    locale: Locale,
    history: VecDeque<Turn>,
    max_turns: usize,
    state: SessionState,
    last_error: Option<String>,
}

impl ChatSession {
    pub fn new(locale: Locale, max_turns: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            report_id: None,
            locale,
            history: VecDeque::new(),
            max_turns,
            state: SessionState::NoReport,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn report_id(&self) -> Option<&str> {
        self.report_id.as_deref()
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    pub fn turns(&self) -> usize {
        self.history.len()
    }

    /// Load (or switch to) a report. Switching clears history.
    pub fn attach_report(&mut self, report_id: impl Into<String>) -> Result<(), ReportError> {
        if self.state == SessionState::AwaitingAnswer {
            return Err(self.invalid("attach a report"));
        }
        self.report_id = Some(report_id.into());
        self.history.clear();
        self.last_error = None;
        self.state = SessionState::ReportLoaded;
        Ok(())
    }

    /// ReportLoaded | AnswerReady -> AwaitingAnswer.
    pub fn begin_question(&mut self) -> Result<PendingQuestion, ReportError> {
        let report_id = match (self.state, &self.report_id) {
            (SessionState::ReportLoaded | SessionState::AnswerReady, Some(id)) => id.clone(),
            _ => return Err(self.invalid("ask a question")),
        };
        self.state = SessionState::AwaitingAnswer;
        self.last_error = None;
        Ok(PendingQuestion {
            report_id,
            locale: self.locale,
            history: self.history.iter().cloned().collect(),
        })
    }

    /// AwaitingAnswer -> AnswerReady, appending the turn to the window.
    pub fn record_answer(&mut self, question: String, answer: String) {
        self.history.push_back(Turn { question, answer });
        while self.history.len() > self.max_turns {
            self.history.pop_front();
        }
        self.state = SessionState::AnswerReady;
    }

    /// AwaitingAnswer -> ReportLoaded with the error flag set.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.state = SessionState::ReportLoaded;
    }

    fn invalid(&self, action: &'static str) -> ReportError {
        ReportError::InvalidTransition {
            action,
            state: self.state,
        }
    }
}

/// Held while a session question is with the provider. Dropping it without
/// `finish` (the request future was cancelled) returns the session to
/// ReportLoaded so it can take questions again.
pub struct InFlight {
    sessions: SessionStore,
    id: Uuid,
    finished: bool,
}

impl InFlight {
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("Session {}: question cancelled before an answer arrived", self.id);
        if let Err(e) = self
            .sessions
            .update(self.id, |session| session.record_failure("request cancelled"))
        {
            debug!("Could not reset cancelled session: {}", e);
        }
    }
}

/// LRU-bounded collection of live sessions.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<LruCache<Uuid, ChatSession>>>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn insert(&self, session: ChatSession) -> Uuid {
        let id = session.id;
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((evicted, _)) = sessions.push(id, session) {
            debug!("SessionStore: evicted session {}", evicted);
        }
        id
    }

    pub fn get(&self, id: Uuid) -> Result<ChatSession, ReportError> {
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(&id)
            .cloned()
            .ok_or(ReportError::SessionNotFound(id))
    }

    /// Move the session to AwaitingAnswer and hand back what the provider
    /// call needs, plus the guard that owns the in-flight state.
    pub fn begin_question(&self, id: Uuid) -> Result<(PendingQuestion, InFlight), ReportError> {
        let pending = self.update(id, |session| session.begin_question())??;
        let in_flight = InFlight {
            sessions: self.clone(),
            id,
            finished: false,
        };
        Ok((pending, in_flight))
    }

    /// Run `f` against the stored session under the lock.
    pub fn update<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ChatSession) -> R,
    ) -> Result<R, ReportError> {
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get_mut(&id)
            .ok_or(ReportError::SessionNotFound(id))?;
        Ok(f(session))
    }
}
