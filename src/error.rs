use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{ValidationError, ValidationErrors};

/// One rejected cell of an imported spreadsheet. `row` is 1-based and counts
/// the header line, so it matches what the user sees in their editor.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct RowError {
    #[schema(example = 3)]
    pub row: usize,
    #[schema(example = "email")]
    pub field: String,
    #[schema(example = "email is not a valid address")]
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("import rejected: {} row error(s)", .0.len())]
    Import(Vec<RowError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Single field-level error, for checks the derive macros can't express.
    pub fn field(field: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, invalid(code, message));
        AppError::Validation(errors)
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        AppError::Internal(anyhow::anyhow!(message.to_string()))
    }
}

/// Builds a `ValidationError` carrying a human message.
pub fn invalid(code: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(code).with_message(message.into().into())
}

/// Flattens validator output into `{field: [messages]}`; falls back to the
/// error code when no message was attached.
pub fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Import(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            AppError::Validation(errors) => json!({
                "message": "One or more fields are invalid",
                "errors": field_messages(errors),
            }),
            AppError::Import(rows) => json!({
                "message": "Import rejected, nothing was saved",
                "rows": rows,
            }),
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                json!({ "message": "Something went wrong, Contact with system admin" })
            }
            other => json!({ "message": other.to_string() }),
        };

        HttpResponse::build(status).json(body)
    }
}

/// Duplicate key (MySQL 1062). Foreign-key failures share SQLSTATE 23000 but
/// are not matched here.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn validation_errors_are_reported_per_field() {
        let err = AppError::field("period_end", "range", "period_end must not precede period_start");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value["errors"]["period_end"][0],
            "period_end must not precede period_start"
        );
    }

    #[actix_web::test]
    async fn internal_errors_hide_details() {
        let err = AppError::internal("font file missing at /secret/path");
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("/secret/path"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(AppError::NotFound("Payroll").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Import(vec![]).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn missing_message_falls_back_to_code() {
        let mut errors = ValidationErrors::new();
        errors.add("email", ValidationError::new("email"));
        let map = field_messages(&errors);
        assert_eq!(map["email"], vec!["email".to_string()]);
    }
}
