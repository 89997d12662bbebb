/// Errors raised by document parsers.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed {format} source: {message}")]
    Malformed { format: String, message: String },

    #[error("empty source")]
    Empty,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
