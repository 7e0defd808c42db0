//! Request-level error taxonomy and its HTML rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tera::Context;

use crate::db::RegistryError;
use crate::docx::TemplateError;
use crate::pdf::ConvertError;
use crate::qr::QrError;

/// Message shown for every lookup miss, so callers cannot tell which field was wrong.
pub const INVALID_CREDENTIALS: &str = "Credentials incorrect";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Identity lookup or verification miss. Never rendered as a system error.
    #[error("{0}")]
    NotFound(String),
    /// A required resource (template, converter) is absent and no fallback remains.
    #[error("{0}")]
    MissingDependency(String),
    #[error("{0}")]
    Fatal(String),
}

impl AppError {
    pub fn fatal(err: impl std::fmt::Display) -> Self {
        Self::Fatal(err.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MissingDependency(_) | Self::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Missing(_) => Self::MissingDependency(err.to_string()),
            other => Self::Fatal(other.to_string()),
        }
    }
}

impl From<ConvertError> for AppError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::MissingDependency(_) => Self::MissingDependency(err.to_string()),
            other => Self::Fatal(other.to_string()),
        }
    }
}

impl From<QrError> for AppError {
    fn from(err: QrError) -> Self {
        Self::Fatal(err.to_string())
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        Self::Fatal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut ctx = Context::new();
        match &self {
            Self::NotFound(_) => ctx.insert("error", INVALID_CREDENTIALS),
            other => {
                tracing::error!(error = %other, "request failed");
                ctx.insert("error", &format!("Could not generate the certificate: {}", other));
            }
        }
        (status, crate::templates::render("error.html", &ctx)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_template_maps_to_missing_dependency() {
        let err: AppError = TemplateError::Missing("/nope.docx".into()).into();
        assert!(matches!(err, AppError::MissingDependency(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_hides_the_underlying_reason() {
        let response = AppError::NotFound("national id 1 not in dataset".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
