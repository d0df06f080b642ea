//! Failure taxonomy for the ingestion and query pipelines.
//!
//! Adapters report failures as [`anyhow::Error`]; the pipelines convert them
//! into a [`RagError`] at the boundary so the HTTP layer can pick a status
//! code without inspecting message text.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Which external collaborator a [`RagError::StoreUnavailable`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    ObjectStore,
    VectorIndex,
    AuditLog,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreKind::ObjectStore => "object store",
            StoreKind::VectorIndex => "vector index",
            StoreKind::AuditLog => "audit log",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    /// Uploaded bytes are not valid UTF-8.
    #[error("'utf-8' codec can't decode {file_name}: {source}")]
    Decode {
        file_name: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("{store} unavailable: {message}")]
    StoreUnavailable { store: StoreKind, message: String },

    /// The generation call failed for any reason. Carries the upstream message.
    #[error("{0}")]
    GenerationUnavailable(String),

    /// Rejected before entering a pipeline.
    #[error("{0}")]
    Validation(String),
}

impl RagError {
    pub fn store(store: StoreKind, err: anyhow::Error) -> Self {
        RagError::StoreUnavailable {
            store,
            message: format!("{:#}", err),
        }
    }

    pub fn generation(err: anyhow::Error) -> Self {
        RagError::GenerationUnavailable(format!("{:#}", err))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RagError::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_names_the_store() {
        let err = RagError::store(StoreKind::VectorIndex, anyhow::anyhow!("connection refused"));
        assert_eq!(
            err.to_string(),
            "vector index unavailable: connection refused"
        );
    }

    #[test]
    fn generation_error_keeps_context_chain() {
        let err = anyhow::anyhow!("model 'nope' not found").context("Ollama chat failed");
        let err = RagError::generation(err);
        assert_eq!(err.to_string(), "Ollama chat failed: model 'nope' not found");
    }

    #[test]
    fn decode_error_mentions_file() {
        let bytes = [0xffu8, 0xfe];
        let source = std::str::from_utf8(&bytes).unwrap_err();
        let err = RagError::Decode {
            file_name: "blob.bin".to_string(),
            source,
        };
        assert!(err.to_string().contains("blob.bin"));
    }
}
