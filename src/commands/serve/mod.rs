//! Local HTTP form for annotating the pool.
//!
//! All handlers lock the shared state for the whole request and never await
//! while holding it, so submissions are processed one at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::cli::ServeArgs;
use crate::error::{StorageError, SubmitError, ValidationError};
use crate::model::Progress;
use crate::pool::load_pool;
use crate::store::{AnnotationStore, open_store};
use crate::workflow::{AnnotationForm, Phase, ScoreRange, SessionState};

mod render;

use self::render::{FormValues, ItemPage};

pub struct AppState {
    session: SessionState,
    store: Box<dyn AnnotationStore>,
    score_range: ScoreRange,
}

impl AppState {
    pub fn new(
        session: SessionState,
        store: Box<dyn AnnotationStore>,
        score_range: ScoreRange,
    ) -> Self {
        Self {
            session,
            store,
            score_range,
        }
    }

    fn progress(&self, rater_id: Option<&str>) -> Result<Option<Progress>, StorageError> {
        rater_id
            .map(|rater_id| self.session.progress(rater_id, self.store.as_ref()))
            .transpose()
    }

    fn location(&self) -> String {
        self.store.location().display().to_string()
    }
}

pub type SharedState = Arc<Mutex<AppState>>;

pub fn run(args: ServeArgs) -> Result<()> {
    let score_range = ScoreRange::new(args.score_min, args.score_max).with_context(|| {
        format!(
            "--score-min ({}) must be lower than --score-max ({})",
            args.score_min, args.score_max
        )
    })?;

    let pool = load_pool(&args.pool_path, args.limit)
        .with_context(|| format!("failed to load pool {}", args.pool_path.display()))?;

    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| args.store.default_output_path());
    let store = open_store(args.store, &output_path).with_context(|| {
        format!(
            "failed to open {} annotation store {}",
            args.store.as_str(),
            output_path.display()
        )
    })?;

    info!(
        pool = %args.pool_path.display(),
        items = pool.len(),
        limit = ?args.limit,
        output = %output_path.display(),
        store = args.store.as_str(),
        score_min = score_range.min(),
        score_max = score_range.max(),
        "starting annotation session"
    );
    if let Some(limit) = args.limit {
        warn!(limit, "test mode: only the first items of the pool are loaded");
    }

    let state = Arc::new(Mutex::new(AppState::new(
        SessionState::new(pool),
        store,
        score_range,
    )));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(serve(state, &args.host, args.port))
}

async fn serve(state: SharedState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(url = %format!("http://{addr}/"), "annotation form listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("annotation server failed")?;

    info!("annotation server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/submit", post(handle_submit))
        .route("/previous", post(handle_previous))
        .route("/next", post(handle_next))
        .route("/restart", post(handle_restart))
        .route("/instructions", get(handle_instructions))
        .route("/progress", get(handle_progress))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn html(status: StatusCode, body: String) -> Response {
    (status, Html(body)).into_response()
}

fn storage_failure(app: &AppState, err: &StorageError) -> Response {
    error!(error = %err, path = %app.location(), "annotation store unavailable");
    html(
        StatusCode::INTERNAL_SERVER_ERROR,
        render::error_page(&err.to_string(), app.score_range),
    )
}

/// Renders the current phase. `echo` carries rejected form values back.
fn render_current(
    app: &AppState,
    status: StatusCode,
    echo: Option<(&AnnotationForm, Option<&ValidationError>)>,
    notice: Option<&str>,
) -> Response {
    let rater_id = echo
        .map(|(form, _)| form.rater_id.trim())
        .filter(|rater_id| !rater_id.is_empty())
        .or(app.session.rater_id());

    // Echoed values must reach the rater even when the log cannot be read.
    let progress = match app.progress(rater_id) {
        Ok(progress) => progress,
        Err(err) if echo.is_some() => {
            warn!(error = %err, path = %app.location(), "progress unavailable");
            None
        }
        Err(err) => return storage_failure(app, &err),
    };

    let Phase::Presenting(index) = app.session.phase() else {
        return html(
            status,
            render::done_page(progress.as_ref(), &app.location(), app.score_range),
        );
    };
    let Some(item) = app.session.current_item() else {
        return html(
            StatusCode::INTERNAL_SERVER_ERROR,
            render::error_page("current item is missing", app.score_range),
        );
    };

    let (score, justification, errors) = match echo {
        Some((form, errors)) => (form.score.clone(), form.justification.clone(), errors),
        None => {
            let existing = match rater_id {
                Some(rater_id) => match app.store.latest_for(&item.id, rater_id) {
                    Ok(existing) => existing,
                    Err(err) => return storage_failure(app, &err),
                },
                None => None,
            };
            match existing {
                Some(row) => (row.score.to_string(), row.justification, None),
                None => (app.score_range.midpoint().to_string(), String::new(), None),
            }
        }
    };

    let page = ItemPage {
        item,
        index,
        total: app.session.pool().len(),
        progress: progress.as_ref(),
        score_range: app.score_range,
        values: FormValues {
            rater_id: rater_id.unwrap_or_default(),
            score: &score,
            justification: &justification,
        },
        errors,
        notice,
    };

    html(status, render::item_page(&page))
}

async fn handle_index(State(state): State<SharedState>) -> Response {
    let app = state.lock();
    render_current(&app, StatusCode::OK, None, None)
}

async fn handle_submit(
    State(state): State<SharedState>,
    Form(form): Form<AnnotationForm>,
) -> Response {
    let mut guard = state.lock();
    let app = &mut *guard;

    let result = app
        .session
        .submit(&form, app.score_range, app.store.as_mut(), Utc::now());

    match result {
        Ok(_) => Redirect::to("/").into_response(),
        Err(SubmitError::Validation(err)) => render_current(
            app,
            StatusCode::UNPROCESSABLE_ENTITY,
            Some((&form, Some(&err))),
            Some("Please fix the highlighted fields."),
        ),
        Err(SubmitError::Storage(err)) => {
            let notice = format!("Annotation was not saved, please retry: {err}");
            render_current(
                app,
                StatusCode::INTERNAL_SERVER_ERROR,
                Some((&form, None)),
                Some(&notice),
            )
        }
        Err(SubmitError::Finished) => Redirect::to("/").into_response(),
    }
}

async fn handle_instructions(State(state): State<SharedState>) -> Html<String> {
    let score_range = state.lock().score_range;
    Html(render::instructions_page(score_range))
}

async fn handle_previous(State(state): State<SharedState>) -> Redirect {
    state.lock().session.previous();
    Redirect::to("/")
}

async fn handle_next(State(state): State<SharedState>) -> Redirect {
    state.lock().session.next();
    Redirect::to("/")
}

async fn handle_restart(State(state): State<SharedState>) -> Redirect {
    state.lock().session.restart();
    Redirect::to("/")
}

#[derive(Debug, Deserialize)]
struct ProgressQuery {
    rater_id: Option<String>,
}

async fn handle_progress(
    State(state): State<SharedState>,
    Query(query): Query<ProgressQuery>,
) -> Response {
    let app = state.lock();
    let rater_id = query
        .rater_id
        .as_deref()
        .map(str::trim)
        .filter(|rater_id| !rater_id.is_empty())
        .or(app.session.rater_id());

    let Some(rater_id) = rater_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "rater_id is required" })),
        )
            .into_response();
    };

    match app.session.progress(rater_id, app.store.as_ref()) {
        Ok(progress) => Json(progress).into_response(),
        Err(err) => {
            error!(error = %err, "failed to compute progress");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn handle_health(State(state): State<SharedState>) -> impl IntoResponse {
    let app = state.lock();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "items": app.session.pool().len(),
        "current_index": app.session.current_index(),
        "store": app.location(),
    }))
}
