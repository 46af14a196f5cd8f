use session::OperationError;

/// Error type for backend calls.
///
/// `Transport` means the request was never answered (connect failure, broken
/// stream); `Backend` means a response arrived but reported or constituted a
/// semantic failure. The split is load-bearing: the session records it on the
/// failed handle and the UI wording differs.
#[derive(Debug)]
pub enum ClientError {
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    Backend {
        message: String,
    },
}

impl ClientError {
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ClientError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        ClientError::Backend {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClientError::Transport { message, .. } | ClientError::Backend { message } => message,
        }
    }

    pub fn to_operation_error(&self) -> OperationError {
        match self {
            ClientError::Transport { message, source } => OperationError::Transport {
                message: match source {
                    Some(source) => format!("{message}: {source}"),
                    None => message.clone(),
                },
            },
            ClientError::Backend { message } => OperationError::Backend {
                message: message.clone(),
            },
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Transport { source, .. } => source.as_ref().map(|e| e.as_ref() as _),
            ClientError::Backend { .. } => None,
        }
    }
}
