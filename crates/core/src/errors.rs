use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("application not found: {0}")]
    ApplicationNotFound(String),
    #[error("application `{0}` has no step awaiting a decision")]
    NoActionableStep(String),
    #[error("approver `{actual}` is not the current approver of `{application_id}` (expected `{expected}`)")]
    WrongApprover { application_id: String, expected: String, actual: String },
    #[error("unrecognized decision outcome `{0}`")]
    InvalidOutcome(String),
    #[error("application `{0}` was modified concurrently")]
    ConcurrentModification(String),
    #[error("batch item `{application_id}` failed: {source}")]
    BatchItemFailure {
        application_id: String,
        #[source]
        source: Box<ApprovalError>,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ApprovalError {
    pub fn batch_item(application_id: impl Into<String>, source: ApprovalError) -> Self {
        Self::BatchItemFailure { application_id: application_id.into(), source: Box::new(source) }
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApplicationNotFound(_) => "application_not_found",
            Self::NoActionableStep(_) => "no_actionable_step",
            Self::WrongApprover { .. } => "wrong_approver",
            Self::InvalidOutcome(_) => "invalid_outcome",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::BatchItemFailure { .. } => "batch_item_failure",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Persistence(_) => "persistence",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

/// Failure inside the detail-document mirror. Recovered by the engine, never
/// returned from a decision.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DocumentSyncError {
    #[error("detail document is not valid JSON: {0}")]
    Parse(String),
    #[error("detail document could not be serialized: {0}")]
    Serialize(String),
    #[error("date format `{0}` cannot render a calendar date")]
    Format(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested application does not exist.",
            Self::Forbidden { .. } => "You are not the approver for the current step.",
            Self::Conflict { .. } => {
                "The application is not awaiting this decision. Refresh and check its state."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Forbidden { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::NotFound { .. } => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "conflict",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<ApprovalError> for InterfaceError {
    fn from(value: ApprovalError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            ApprovalError::ApplicationNotFound(_) => Self::NotFound { message, correlation_id },
            ApprovalError::WrongApprover { .. } => Self::Forbidden { message, correlation_id },
            ApprovalError::NoActionableStep(_) | ApprovalError::ConcurrentModification(_) => {
                Self::Conflict { message, correlation_id }
            }
            ApprovalError::InvalidOutcome(_) | ApprovalError::InvalidRequest(_) => {
                Self::BadRequest { message, correlation_id }
            }
            ApprovalError::Persistence(_) => Self::ServiceUnavailable { message, correlation_id },
            ApprovalError::BatchItemFailure { source, .. } => {
                // The batch failed as a whole; classify by what broke it.
                let mut mapped = Self::from(*source);
                match &mut mapped {
                    Self::BadRequest { message: inner, .. }
                    | Self::NotFound { message: inner, .. }
                    | Self::Forbidden { message: inner, .. }
                    | Self::Conflict { message: inner, .. }
                    | Self::ServiceUnavailable { message: inner, .. }
                    | Self::Internal { message: inner, .. } => *inner = message,
                }
                mapped
            }
        }
    }
}
