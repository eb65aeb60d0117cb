use serde::{Deserialize, Serialize};

// ============= API Request/Response Types =============

/// Body of `POST /rag/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagChatRequest {
    pub query: String,
    /// Number of chunks to retrieve; the server default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

/// Body of `POST /rag/search`. Answered with scored hits, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

/// Body of `POST /casual/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasualChatRequest {
    pub content: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTextsRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteByIndexRequest {
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEmbeddingModelRequest {
    pub new_model_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTextRequest {
    pub index: u64,
    pub new_text: String,
}

/// Acknowledgement returned by every mutating `/rag/*` route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

/// Lifecycle state of the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    /// Nothing has been created or loaded yet.
    Absent,
    /// Initialized but holding no entries.
    Empty,
    /// Holding at least one entry.
    Populated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub activated: bool,
    pub embedding_model: String,
    pub store_state: StoreState,
    pub entry_count: usize,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A document could not be read or parsed.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// The embedding provider failed or returned unusable vectors.
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store is not initialized")]
    NotInitialized,

    #[error("Retrieval is not activated for this session")]
    NotActivated,

    #[error("Index {0} not found")]
    IndexNotFound(u64),

    /// Malformed or interrupted event stream, or a failed HTTP exchange.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Generation backend failure.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tianqi_vector::Error> for AppError {
    fn from(err: tianqi_vector::Error) -> Self {
        match err {
            tianqi_vector::Error::IndexNotFound(index) => AppError::IndexNotFound(index),
            tianqi_vector::Error::DimensionMismatch { .. }
            | tianqi_vector::Error::InvalidVector(_) => AppError::Embedding(err.to_string()),
            tianqi_vector::Error::Io(e) => AppError::Io(e),
            tianqi_vector::Error::Persistence(msg) => {
                AppError::Internal(format!("Vector store persistence: {}", msg))
            }
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::NotActivated | AppError::NotInitialized => StatusCode::CONFLICT,
            AppError::IndexNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Embedding(_) | AppError::Backend(_) => StatusCode::BAD_GATEWAY,
            AppError::Ingestion(_)
            | AppError::Protocol(_)
            | AppError::Configuration(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (AppError::NotActivated, StatusCode::CONFLICT),
            (AppError::NotInitialized, StatusCode::CONFLICT),
            (AppError::IndexNotFound(3), StatusCode::NOT_FOUND),
            (AppError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Embedding("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Backend("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_vector_error_conversion() {
        let err: AppError = tianqi_vector::Error::IndexNotFound(9).into();
        assert!(matches!(err, AppError::IndexNotFound(9)));

        let err: AppError = tianqi_vector::Error::DimensionMismatch {
            expected: 3,
            actual: 2,
        }
        .into();
        assert!(matches!(err, AppError::Embedding(_)));
    }

    #[test]
    fn test_chat_request_k_optional() {
        let req: RagChatRequest = serde_json::from_str(r#"{"query":"hi"}"#).unwrap();
        assert_eq!(req.k, None);

        let req: CasualChatRequest = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(req.role, "user");
    }

    #[test]
    fn test_store_state_serde() {
        assert_eq!(
            serde_json::to_string(&StoreState::Populated).unwrap(),
            "\"populated\""
        );
    }
}
