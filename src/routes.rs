//! HTTP surface: stateless upload/ask/summarize, chat sessions, static files.

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, FromRequest,
        Multipart, Path, Request, State,
    },
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::completion::{CompletionError, GenerationParams, Message};
use crate::error::ReportError;
use crate::prompt::{self, Locale};
use crate::report_store::{Report, ReportSummary};
use crate::session::{ChatSession, PendingQuestion, SessionState, Turn};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.settings.static_dir);
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/upload/", post(upload_report))
        .route("/ask/", post(ask_question))
        .route("/summarize/", post(summarize_report))
        .route("/reports/", get(list_reports))
        .route("/reports/{id}", get(get_report))
        .route("/sessions/", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/report", put(attach_session_report))
        .route("/sessions/{id}/ask", post(ask_in_session))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Request/Response types
// ============================================================================

/// JSON body whose rejections render as `ReportError` bodies.
struct JsonBody<T>(T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ReportError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    report_id: String,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    report_id: String,
    question: String,
    #[serde(default)]
    language: Option<Locale>,
}

#[derive(Debug, Serialize)]
struct AnswerResponse {
    answer: String,
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    report_id: String,
    #[serde(default)]
    language: Option<Locale>,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    summary: String,
}

#[derive(Debug, Serialize)]
struct ReportDetail {
    #[serde(flatten)]
    summary: ReportSummary,
    text: String,
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    report_id: Option<String>,
    #[serde(default)]
    language: Option<Locale>,
}

#[derive(Debug, Deserialize)]
struct AttachReportRequest {
    report_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionAskRequest {
    question: String,
}

#[derive(Debug, Serialize)]
struct SessionAnswerResponse {
    answer: String,
    state: SessionState,
    turns: usize,
}

#[derive(Debug, Serialize)]
struct SessionView {
    session_id: Uuid,
    report_id: Option<String>,
    language: Locale,
    state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    history: Vec<Turn>,
}

impl From<&ChatSession> for SessionView {
    fn from(session: &ChatSession) -> Self {
        Self {
            session_id: session.id,
            report_id: session.report_id().map(str::to_string),
            language: session.locale(),
            state: session.state(),
            last_error: session.last_error().map(str::to_string),
            history: session.history().cloned().collect(),
        }
    }
}

// ============================================================================
// Stateless handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Upload a report, extract its text and store it under its filename.
async fn upload_report(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ReportError> {
    let limit = state.settings.max_upload_bytes;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| ReportError::InvalidRequest("Uploaded file has no filename".into()))?;
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, limit))?;
            upload = Some((filename, content_type, data));
            break;
        }
    }

    let (filename, content_type, data) =
        upload.ok_or_else(|| ReportError::InvalidRequest("No file uploaded".into()))?;

    info!("Received file: {} ({} bytes)", filename, data.len());

    let extracted = state
        .extractor
        .extract(&filename, content_type.as_deref(), data.to_vec())
        .await?;

    if let Some(previous) = state.reports.put(Report::new(filename.clone(), extracted)) {
        warn!(
            "Report '{}' replaced a previous upload from {}",
            filename, previous.uploaded_at
        );
    }
    debug!("{} reports in store", state.reports.len());

    Ok(Json(UploadResponse {
        message: "Report uploaded successfully",
        report_id: filename,
    }))
}

/// Answer a single question about a stored report.
async fn ask_question(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AskRequest>,
) -> Result<Json<AnswerResponse>, ReportError> {
    let question = non_empty_question(&req.question)?;
    let report = state.reports.get(&req.report_id)?;
    let locale = req.language.unwrap_or(state.settings.default_locale);

    info!("Question about {} ({})", report.id, locale);

    let messages = prompt::compose_question(&report.text, question, locale);
    let answer = complete(
        &state,
        messages,
        &state.settings.ask,
        locale.templates().no_answer,
    )
    .await?;

    Ok(Json(AnswerResponse { answer }))
}

/// Summarize a stored report.
async fn summarize_report(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SummarizeRequest>,
) -> Result<Json<SummaryResponse>, ReportError> {
    let report = state.reports.get(&req.report_id)?;
    let locale = req.language.unwrap_or(state.settings.default_locale);

    info!("Summary of {} ({})", report.id, locale);

    let messages = prompt::compose_summary(&report.text, locale);
    let summary = complete(
        &state,
        messages,
        &state.settings.summary,
        locale.templates().no_summary,
    )
    .await?;

    Ok(Json(SummaryResponse { summary }))
}

/// List stored reports, most recently used first.
async fn list_reports(State(state): State<AppState>) -> Json<Vec<ReportSummary>> {
    Json(state.reports.list())
}

/// One report with its full extracted text.
async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportDetail>, ReportError> {
    let report = state.reports.get(&id)?;
    Ok(Json(ReportDetail {
        summary: ReportSummary::from(&report),
        text: report.text,
    }))
}

// ============================================================================
// Session handlers
// ============================================================================

async fn create_session(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateSessionRequest>,
) -> Result<Json<SessionView>, ReportError> {
    let locale = req.language.unwrap_or(state.settings.default_locale);
    let mut session = ChatSession::new(locale, state.settings.session_history_turns);

    if let Some(report_id) = req.report_id {
        ensure_report(&state, &report_id)?;
        session.attach_report(report_id)?;
    }

    let view = SessionView::from(&session);
    let id = state.sessions.insert(session);
    info!("Session {} created ({:?})", id, view.state);
    Ok(Json(view))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ReportError> {
    let session = state.sessions.get(id)?;
    Ok(Json(SessionView::from(&session)))
}

async fn attach_session_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<AttachReportRequest>,
) -> Result<Json<SessionView>, ReportError> {
    ensure_report(&state, &req.report_id)?;
    let view = state
        .sessions
        .update(id, |session| -> Result<SessionView, ReportError> {
            session.attach_report(req.report_id.clone())?;
            Ok(SessionView::from(&*session))
        })??;
    info!("Session {} now on report {}", id, req.report_id);
    Ok(Json(view))
}

/// Ask a follow-up question; the retained history is replayed to the model.
async fn ask_in_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<SessionAskRequest>,
) -> Result<Json<SessionAnswerResponse>, ReportError> {
    let question = non_empty_question(&req.question)?;
    let (pending, in_flight) = state.sessions.begin_question(id)?;

    let result = answer_pending(&state, &pending, question).await;
    in_flight.finish();

    match result {
        Ok(answer) => {
            let recorded = state.sessions.update(id, |session| {
                session.record_answer(question.to_string(), answer.clone());
                session.turns()
            });
            let turns = match recorded {
                Ok(turns) => turns,
                Err(_) => {
                    warn!("Session {} was evicted while answering; turn not kept", id);
                    (pending.history.len() + 1).min(state.settings.session_history_turns)
                }
            };
            Ok(Json(SessionAnswerResponse {
                answer,
                state: SessionState::AnswerReady,
                turns,
            }))
        }
        Err(err) => {
            if let Err(gone) = state
                .sessions
                .update(id, |session| session.record_failure(err.to_string()))
            {
                debug!("Could not record failure: {}", gone);
            }
            Err(err)
        }
    }
}

async fn answer_pending(
    state: &AppState,
    pending: &PendingQuestion,
    question: &str,
) -> Result<String, ReportError> {
    let report = state.reports.get(&pending.report_id)?;
    let messages =
        prompt::compose_session(&report.text, &pending.history, question, pending.locale);
    complete(
        state,
        messages,
        &state.settings.ask,
        pending.locale.templates().no_answer,
    )
    .await
}

// ============================================================================
// Helper functions
// ============================================================================

fn non_empty_question(question: &str) -> Result<&str, ReportError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ReportError::InvalidRequest("Question must not be empty".into()));
    }
    Ok(question)
}

fn multipart_error(err: MultipartError, limit: usize) -> ReportError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ReportError::PayloadTooLarge { limit }
    } else {
        ReportError::InvalidRequest(format!("Multipart error: {}", err.body_text()))
    }
}

fn ensure_report(state: &AppState, report_id: &str) -> Result<(), ReportError> {
    if state.reports.contains(report_id) {
        Ok(())
    } else {
        Err(ReportError::NotFound(report_id.to_string()))
    }
}

/// Run one completion, turning an empty reply into the localized no-answer error.
async fn complete(
    state: &AppState,
    messages: Vec<Message>,
    params: &GenerationParams,
    no_answer: &str,
) -> Result<String, ReportError> {
    match state.completion.complete(messages, params).await {
        Ok(text) => Ok(text),
        Err(CompletionError::EmptyResponse) => Err(ReportError::NoAnswer(no_answer.to_string())),
        Err(e) => Err(e.into()),
    }
}
