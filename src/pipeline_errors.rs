use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing required column for {field}: expected one of {expected:?}, available columns: {found:?}")]
    Schema {
        field: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Resource not found: {0}")]
    MissingResource(Utf8PathBuf),

    #[error("Invalid sample at row {row}: field {field} is null or not a number")]
    InvalidSample { row: usize, field: String },

    #[error("Rendering failed after {attempts} attempt(s): {message}")]
    RenderFailure { attempts: u32, message: String },

    #[error("External tool timed out after {0} seconds")]
    RenderTimeout(u64),

    #[error("External tool not found in PATH: {0}")]
    ToolNotFound(String),

    #[error("Vision model credential error: {0}")]
    Credential(String),

    #[error("Vision model returned an unusable response: {0}")]
    VisionResponse(String),

    #[error("Invalid pipeline parameter: {0}")]
    InvalidParameter(String),

    #[error("Non UTF-8 path: {0}")]
    Utf8PathError(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("HTTP reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Image decoding error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl PipelineError {
    /// Whether this error must abort the run.
    ///
    /// Schema, credential and parameter errors are fatal. Everything else is
    /// scoped to the record being processed: the record is skipped (or retried,
    /// for rendering) and the batch continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Schema { .. }
                | PipelineError::Credential(_)
                | PipelineError::InvalidParameter(_)
        )
    }

    pub(crate) fn render_failure(attempts: u32, message: impl Into<String>) -> Self {
        PipelineError::RenderFailure {
            attempts,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod pipeline_errors_test {
    use super::*;

    #[test]
    fn test_fatal_taxonomy() {
        let schema = PipelineError::Schema {
            field: "longitude",
            expected: vec!["long".into()],
            found: vec!["foo".into()],
        };
        assert!(schema.is_fatal());
        assert!(PipelineError::Credential("OPENAI_API_KEY not set".into()).is_fatal());
        assert!(PipelineError::InvalidParameter("buffer".into()).is_fatal());

        assert!(!PipelineError::MissingResource("a.csv".into()).is_fatal());
        assert!(!PipelineError::InvalidSample {
            row: 3,
            field: "lat".into()
        }
        .is_fatal());
        assert!(!PipelineError::render_failure(3, "exit 1").is_fatal());
        assert!(!PipelineError::RenderTimeout(30).is_fatal());
    }

    #[test]
    fn test_schema_message_lists_columns() {
        let err = PipelineError::Schema {
            field: "latitude",
            expected: vec!["lat".into(), "latitude".into()],
            found: vec!["name".into(), "lon".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("latitude"));
        assert!(msg.contains("\"lat\""));
        assert!(msg.contains("\"name\""));
        assert!(msg.contains("\"lon\""));
    }
}
