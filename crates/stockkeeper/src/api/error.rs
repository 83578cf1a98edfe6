use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// JSON wrapper for all error responses (non-2xx).
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ErrorModel,
}

/// JSON error payload with further details on the error.
#[derive(Default, Debug, TypedBuilder, Serialize, Deserialize)]
pub struct ErrorModel {
    /// Human-readable error message
    #[builder(setter(into))]
    pub message: String,
    /// Internal type definition of the error
    #[builder(setter(into))]
    pub r#type: String,
    /// HTTP response code
    pub code: u16,
    #[serde(skip)]
    #[builder(default)]
    pub source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub stack: Vec<String>,
    #[serde(skip)]
    #[builder(default=uuid::Uuid::now_v7())]
    pub error_id: Uuid,
}

impl StdError for ErrorModel {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl Display for ErrorModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({}): {}", self.r#type, self.code, self.message)?;

        if !self.stack.is_empty() {
            writeln!(f, "Stack:")?;
            for detail in &self.stack {
                writeln!(f, "  {detail}")?;
            }
        }

        if let Some(source) = self.source.as_ref() {
            writeln!(f, "Caused by:")?;
            error_chain_fmt(&**source, f)?;
        }

        Ok(())
    }
}

fn error_chain_fmt(e: impl StdError, f: &mut Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "{e}\n")?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{cause}")?;
        current = cause.source();
    }
    Ok(())
}

impl ErrorModel {
    pub fn new(
        message: impl Into<String>,
        r#type: impl Into<String>,
        code: u16,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self::builder()
            .message(message)
            .r#type(r#type)
            .code(code)
            .source(source)
            .build()
    }

    pub fn bad_request(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(message, r#type, StatusCode::BAD_REQUEST.as_u16(), source)
    }

    pub fn not_found(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(message, r#type, StatusCode::NOT_FOUND.as_u16(), source)
    }

    pub fn conflict(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(message, r#type, StatusCode::CONFLICT.as_u16(), source)
    }

    /// 429-equivalent used when a worker pool rejects a submission.
    pub fn too_many_requests(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(
            message,
            r#type,
            StatusCode::TOO_MANY_REQUESTS.as_u16(),
            source,
        )
    }

    pub fn unprocessable(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(
            message,
            r#type,
            StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
            source,
        )
    }

    pub fn internal(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(
            message,
            r#type,
            StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            source,
        )
    }

    #[must_use]
    pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
        self.stack.push(detail.into());
        self
    }
}

impl From<ErrorModel> for ApiErrorResponse {
    fn from(value: ErrorModel) -> Self {
        ApiErrorResponse { error: value }
    }
}

impl From<ApiErrorResponse> for ErrorModel {
    fn from(value: ApiErrorResponse) -> Self {
        value.error
    }
}

impl Display for ApiErrorResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

fn error_chain_vec(e: &(dyn StdError + Send + Sync + 'static)) -> Vec<String> {
    let mut details = Vec::new();
    let mut current = Some(e as &(dyn StdError + 'static));
    while let Some(cause) = current {
        details.push(format!("{cause}"));
        current = cause.source();
    }
    details
}

impl axum::response::IntoResponse for ErrorModel {
    fn into_response(self) -> axum::http::Response<axum::body::Body> {
        ApiErrorResponse { error: self }.into_response()
    }
}

impl axum::response::IntoResponse for ApiErrorResponse {
    fn into_response(self) -> axum::http::Response<axum::body::Body> {
        let Self { error } = self;
        let ErrorModel {
            message,
            r#type,
            code,
            source,
            stack,
            error_id,
        } = error;
        let source_chain = source.map(|e| error_chain_vec(&*e)).unwrap_or_default();

        // Hide the stack from the user for 5xx errors, only log it.
        let mut response = if code >= 500 {
            tracing::error!(
                %error_id,
                code,
                r#type,
                message,
                stack = ?stack,
                source = ?source_chain,
                "Internal server error response"
            );
            axum::Json(ApiErrorResponse {
                error: ErrorModel {
                    message,
                    r#type,
                    code,
                    source: None,
                    stack: vec![format!("Error ID: {error_id}")],
                    error_id,
                },
            })
            .into_response()
        } else {
            tracing::info!(
                %error_id,
                code,
                r#type,
                message,
                stack = ?stack,
                source = ?source_chain,
                "Error response"
            );
            let mut stack = stack;
            stack.push(format!("Error ID: {error_id}"));

            axum::Json(ApiErrorResponse {
                error: ErrorModel {
                    message,
                    r#type,
                    code,
                    source: None,
                    stack,
                    error_id,
                },
            })
            .into_response()
        };

        *response.status_mut() = axum::http::StatusCode::from_u16(code)
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        response
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt as _;

    use super::*;

    #[tokio::test]
    async fn test_error_response_serialization() {
        let val = ApiErrorResponse {
            error: ErrorModel::builder()
                .message("Task with id `42` not found")
                .r#type("TaskNotFound")
                .code(StatusCode::NOT_FOUND.as_u16())
                .build(),
        };
        let resp = axum::response::IntoResponse::into_response(val);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let buf = resp.into_body().collect().await.unwrap().to_bytes();
        let resp: ApiErrorResponse = serde_json::from_slice(&buf).unwrap();
        assert_eq!(resp.error.message, "Task with id `42` not found");
        assert_eq!(resp.error.r#type, "TaskNotFound");
        assert_eq!(resp.error.code, 404);
    }

    #[tokio::test]
    async fn test_server_error_redacts_stack_and_adds_error_id() {
        let val = ApiErrorResponse {
            error: ErrorModel::builder()
                .message("internal error")
                .r#type("Internal")
                .code(500)
                .stack(vec!["secret detail".into()])
                .build(),
        };
        let resp = axum::response::IntoResponse::into_response(val);
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let buf = resp.into_body().collect().await.unwrap().to_bytes();
        let parsed: ApiErrorResponse = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed.error.stack.len(), 1);
        assert!(parsed.error.stack[0].starts_with("Error ID: "));
    }

    #[test]
    fn test_error_model_display() {
        let error = ErrorModel::builder()
            .message("Something went wrong")
            .r#type("TestError")
            .code(500)
            .build();

        let display_output = format!("{error}");
        assert!(display_output.contains("Something went wrong"));
        assert!(display_output.contains("TestError"));
        assert!(display_output.contains("500"));
        assert!(!display_output.contains("Stack:"));
        assert!(!display_output.contains("Caused by:"));
    }
}
