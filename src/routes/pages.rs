use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use std::sync::Arc;
use tera::Context;

use crate::dataset::{self, HolderRow};
use crate::db::VerificationView;
use crate::error::{AppError, INVALID_CREDENTIALS};
use crate::session::{expired_cookie, session_cookie, Session};
use crate::state::AppState;
use crate::templates::render;

pub const PAGE_SIZE: i64 = 10;

pub async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match state.sessions.current(&headers) {
        Some((_, Session::Admin)) => Redirect::to("/admin").into_response(),
        Some((token, Session::Holder { national_id })) => {
            match lookup_holder(&state, &national_id, None, false).await {
                Some(holder) => confirmation_page(&holder).into_response(),
                None => {
                    // The row left the dataset since login.
                    state.sessions.remove(&token);
                    (
                        [(header::SET_COOKIE, expired_cookie())],
                        login_page(None),
                    )
                        .into_response()
                }
            }
        }
        None => login_page(None).into_response(),
    }
}

#[derive(Deserialize)]
pub struct LoginForm {
    form_type: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Login and logout share `POST /`, told apart by `form_type`.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    if form.form_type == "logout" {
        if let Some((token, _)) = state.sessions.current(&headers) {
            state.sessions.remove(&token);
        }
        return ([(header::SET_COOKIE, expired_cookie())], Redirect::to("/")).into_response();
    }

    let username = form.username.trim();
    let password = form.password.trim();
    if username.is_empty() || password.is_empty() {
        return login_page(Some(INVALID_CREDENTIALS)).into_response();
    }

    if let Some(admin) = &state.config.admin {
        if admin.username == username && admin.password == password {
            let token = state.sessions.create(Session::Admin);
            tracing::info!("Administrator logged in");
            return ([(header::SET_COOKIE, session_cookie(&token))], Redirect::to("/admin"))
                .into_response();
        }
    }

    match lookup_holder(&state, username, Some(password), true).await {
        Some(holder) => {
            let token = state.sessions.create(Session::Holder {
                national_id: holder.national_id.clone(),
            });
            (
                [(header::SET_COOKIE, session_cookie(&token))],
                confirmation_page(&holder),
            )
                .into_response()
        }
        None => {
            tracing::info!("Rejected login attempt");
            login_page(Some(INVALID_CREDENTIALS)).into_response()
        }
    }
}

pub async fn verify_page(
    State(state): State<Arc<AppState>>,
    Path(certificate_id): Path<String>,
) -> Result<Html<String>, AppError> {
    let record = state.registry.find(&certificate_id).await?;

    let mut ctx = Context::new();
    ctx.insert("valid", &record.is_some());
    match record {
        Some(record) => ctx.insert("certificate", &VerificationView::from(&record)),
        None => ctx.insert("message", "This certificate is not registered."),
    }
    Ok(render("verify.html", &ctx))
}

pub async fn admin_panel(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !state.sessions.is_admin(&headers) {
        return Redirect::to("/").into_response();
    }
    admin_page(&state, None, None).into_response()
}

/// Replaces the stored dataset with the uploaded `dataset_file`.
pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !state.sessions.is_admin(&headers) {
        return Redirect::to("/").into_response();
    }

    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, admin_page(&state, None, Some(&message)))
                .into_response()
        }
    };
    let Some((filename, bytes)) = upload.file else {
        return (
            StatusCode::BAD_REQUEST,
            admin_page(&state, None, Some("Please select a dataset file.")),
        )
            .into_response();
    };

    let config = state.config.clone();
    let name = filename.clone();
    let stored =
        tokio::task::spawn_blocking(move || crate::storage::store_dataset(&config, &name, bytes))
            .await;
    match stored {
        Ok(Ok(rows)) => {
            tracing::info!(rows, file = %filename, "Dataset replaced");
            let message = format!("Dataset uploaded: {} rows loaded.", rows);
            admin_page(&state, Some(&message), None).into_response()
        }
        Ok(Err(e)) => {
            tracing::warn!(file = %filename, "Dataset rejected: {}", e);
            let message = format!("Could not load the dataset: {}", e);
            (StatusCode::BAD_REQUEST, admin_page(&state, None, Some(&message))).into_response()
        }
        Err(e) => AppError::fatal(e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct Pagination {
    page: Option<i64>,
}

pub async fn list_certificates(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(pagination): Query<Pagination>,
) -> Result<Response, AppError> {
    if !state.sessions.is_admin(&headers) {
        return Ok(Redirect::to("/").into_response());
    }

    let total = state.registry.count().await?;
    let total_pages = ((total + PAGE_SIZE - 1) / PAGE_SIZE).max(1);
    let page = pagination.page.unwrap_or(1).clamp(1, total_pages);
    let certificates = state
        .registry
        .list_recent(PAGE_SIZE, (page - 1) * PAGE_SIZE)
        .await?;

    let mut ctx = Context::new();
    ctx.insert("certificates", &certificates);
    ctx.insert("total", &total);
    ctx.insert("page", &page);
    ctx.insert("total_pages", &total_pages);
    ctx.insert("has_prev", &(page > 1));
    ctx.insert("has_next", &(page < total_pages));
    Ok(render("certificates.html", &ctx).into_response())
}

/// Form fields of an admin upload, with the file kept in memory.
#[derive(Default)]
pub struct Upload {
    pub file: Option<(String, Vec<u8>)>,
    pub count: Option<String>,
}

pub async fn read_upload(multipart: &mut Multipart) -> Result<Upload, String> {
    let mut upload = Upload::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(format!("Malformed upload: {}", e)),
        };
        let name = field.name().unwrap_or("").to_string();
        if name == "dataset_file" {
            let filename = field.file_name().unwrap_or("").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("Malformed upload: {}", e))?;
            if !filename.is_empty() && !bytes.is_empty() {
                upload.file = Some((filename, bytes.to_vec()));
            }
        } else if name == "count" {
            if let Ok(text) = field.text().await {
                upload.count = Some(text);
            }
        }
    }
    Ok(upload)
}

pub fn admin_page(state: &AppState, message: Option<&str>, error: Option<&str>) -> Html<String> {
    let dataset_loaded = dataset::current_path(&state.config.dataset_dir()).is_some();
    let mut ctx = Context::new();
    ctx.insert("dataset_loaded", &dataset_loaded);
    ctx.insert("message", &message);
    ctx.insert("error", &error);
    render("admin.html", &ctx)
}

fn login_page(error: Option<&str>) -> Html<String> {
    let mut ctx = Context::new();
    ctx.insert("error", &error);
    render("index.html", &ctx)
}

fn confirmation_page(holder: &HolderRow) -> Html<String> {
    let mut ctx = Context::new();
    ctx.insert("holder", holder);
    render("confirmation.html", &ctx)
}

/// Identity lookup against the stored dataset, off the async workers.
pub async fn lookup_holder(
    state: &AppState,
    national_id: &str,
    code: Option<&str>,
    code_required: bool,
) -> Option<HolderRow> {
    let dataset_dir = state.config.dataset_dir();
    let national_id = national_id.to_string();
    let code = code.map(str::to_string);
    let lookup = tokio::task::spawn_blocking(move || {
        let path = dataset::current_path(&dataset_dir);
        dataset::resolve(path.as_deref(), &national_id, code.as_deref(), code_required)
    });
    match lookup.await {
        Ok(holder) => holder,
        Err(e) => {
            tracing::error!("Holder lookup task failed: {}", e);
            None
        }
    }
}
