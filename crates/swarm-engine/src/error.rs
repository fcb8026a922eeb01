use swarm_core::errors::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Subagent '{0}' does not exist")]
    UnknownSubagent(String),

    #[error("Unknown subagents: {}", .0.join(", "))]
    MissingSubagents(Vec<String>),

    #[error("Subagent '{0}' already exists")]
    SubagentExists(String),

    #[error("summarization failed: {0}")]
    Summarization(String),
}

impl EngineError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gateway(e) => e.error_kind(),
            Self::UnknownSubagent(_) | Self::MissingSubagents(_) => "unknown_subagent",
            Self::SubagentExists(_) => "subagent_exists",
            Self::Summarization(_) => "summarization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_subagents_lists_every_name() {
        let err = EngineError::MissingSubagents(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Unknown subagents: a, b");
    }

    #[test]
    fn gateway_errors_convert() {
        let err: EngineError = GatewayError::ProviderOverloaded.into();
        assert!(matches!(err, EngineError::Gateway(_)));
        assert_eq!(err.kind(), "provider_overloaded");
    }

    #[test]
    fn kinds_name_the_failure() {
        let auth: EngineError = GatewayError::AuthenticationFailed("bad key".into()).into();
        assert_eq!(auth.kind(), "authentication_failed");
        assert_eq!(EngineError::MissingSubagents(vec!["a".into()]).kind(), "unknown_subagent");
        assert_eq!(EngineError::Summarization("down".into()).kind(), "summarization");
    }
}
