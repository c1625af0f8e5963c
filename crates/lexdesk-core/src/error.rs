use thiserror::Error;

/// Error taxonomy shared by every callable operation.
///
/// The `Display` form carries internal diagnostic detail and is only ever
/// logged server-side; [`ApiError::user_message`] is what crosses the wire.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    /// `what` is the user-facing (Portuguese) noun, e.g. "Petição".
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rate limit of {max_per_hour}/h reached for {action}")]
    ResourceExhausted {
        action: String,
        max_per_hour: u32,
        retry_after_s: i64,
    },

    #[error("analysis stage failed: {0}")]
    AnalysisFailed(String),

    #[error("structuring stage failed: {0}")]
    StructuringFailed(String),

    #[error("generation stage failed: {0}")]
    GenerationFailed(String),

    #[error("document rendering failed: {0}")]
    RenderFailed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// User-safe message, generic, in the user's language. Never includes
    /// provider bodies, stack detail, or store errors.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthenticated => "Autenticação necessária.".into(),
            Self::NotFound(what) => format!("{what} não encontrado."),
            Self::PermissionDenied(msg) => msg.clone(),
            Self::InvalidArgument(msg) => msg.clone(),
            Self::ResourceExhausted {
                action: _,
                max_per_hour,
                retry_after_s,
            } => format!(
                "Limite de {max_per_hour} chamadas por hora atingido. Tente novamente em {} minutos.",
                (retry_after_s / 60).max(1)
            ),
            Self::AnalysisFailed(_) => "Erro ao analisar o caso. Tente novamente.".into(),
            Self::StructuringFailed(_) => "Erro ao gerar a estrutura. Tente novamente.".into(),
            Self::GenerationFailed(_) => "Erro ao gerar o documento. Tente novamente.".into(),
            Self::RenderFailed(_) | Self::Storage(_) | Self::Internal(_) => {
                "Erro interno. Tente novamente.".into()
            }
        }
    }

    /// Whether the caller may retry the same call and expect it to succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. }
                | Self::AnalysisFailed(_)
                | Self::StructuringFailed(_)
                | Self::GenerationFailed(_)
                | Self::RenderFailed(_)
                | Self::Internal(_)
        )
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
