use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

pub type AppResult<T> = Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    // caller sent something we can't proxy, the url is echoed back so they can see what we got
    #[error("{message}")]
    InvalidTarget {
        kind: &'static str,
        message: String,
        url: Option<String>,
    },

    // couldn't reach the broadcaster at all
    #[error("{message}")]
    UpstreamUnavailable {
        kind: &'static str,
        message: String,
        url: String,
        status: Option<u16>,
        status_text: Option<String>,
    },

    // the broadcaster answered but said no
    #[error("upstream responded with {status}")]
    UpstreamStatus { status: StatusCode, url: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
            Error::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::UpstreamStatus { status, .. } => *status,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let message = self.to_string();
        match self {
            Error::BadRequest(_) => ErrorBody {
                error: "bad_request".to_string(),
                message,
                url: None,
                status: None,
                status_text: None,
            },
            Error::InvalidTarget { kind, url, .. } => ErrorBody {
                error: kind.to_string(),
                message,
                url: url.clone(),
                status: None,
                status_text: None,
            },
            Error::UpstreamUnavailable {
                kind,
                url,
                status,
                status_text,
                ..
            } => ErrorBody {
                error: kind.to_string(),
                message,
                url: Some(url.clone()),
                status: *status,
                status_text: status_text.clone(),
            },
            Error::UpstreamStatus { status, url } => ErrorBody {
                error: "upstream_status".to_string(),
                message,
                url: Some(url.clone()),
                status: Some(status.as_u16()),
                status_text: status.canonical_reason().map(str::to_string),
            },
            Error::NotFound(_) => ErrorBody {
                error: "not_found".to_string(),
                message,
                url: None,
                status: None,
                status_text: None,
            },
            Error::InternalServerErrorWithContext(_) => ErrorBody {
                error: "internal".to_string(),
                message,
                url: None,
                status: None,
                status_text: None,
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("responding {}: {}", status, self);
        } else {
            debug!("responding {}: {}", status, self);
        }

        (status, Json(self.body())).into_response()
    }
}
