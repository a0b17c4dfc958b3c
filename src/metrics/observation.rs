//! Per-request and per-dependency-call records handed to the recorder.

use crate::filter::classify::is_error;

/// Everything measured about one instrumented request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestObservation {
    pub protocol: String,
    pub status: u16,
    pub method: String,
    pub path: String,
    pub is_error: bool,
    pub error_message: String,
    pub elapsed_seconds: f64,
    pub byte_count: u64,
}

impl RequestObservation {
    /// Label values in registration order: type, status, method, addr, isError, errorMessage.
    pub(crate) fn label_values(&self) -> [String; 6] {
        [
            self.protocol.clone(),
            self.status.to_string(),
            self.method.clone(),
            self.path.clone(),
            self.is_error.to_string(),
            self.error_message.clone(),
        ]
    }
}

/// A call made by the application to one of its dependencies.
///
/// `error_message` is raw text; it is sanitized before it becomes a label.
#[derive(Clone, Debug, Default)]
pub struct DependencyEvent {
    pub name: String,
    pub protocol: String,
    pub status: u16,
    pub method: String,
    pub path: String,
    pub error_message: Option<String>,
}

impl DependencyEvent {
    pub fn new(name: impl Into<String>, protocol: impl Into<String>) -> Self {
        DependencyEvent {
            name: name.into(),
            protocol: protocol.into(),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_error(&self) -> bool {
        is_error(self.status)
    }
}

/// Fully resolved label values of `dependency_request_seconds`.
#[derive(Clone, Debug, PartialEq)]
pub struct DependencyLabels {
    pub name: String,
    pub protocol: String,
    pub status: String,
    pub method: String,
    pub path: String,
    pub is_error: bool,
    pub error_message: String,
}

impl DependencyLabels {
    pub(crate) fn label_values(&self) -> [String; 7] {
        [
            self.name.clone(),
            self.protocol.clone(),
            self.status.clone(),
            self.method.clone(),
            self.path.clone(),
            self.is_error.to_string(),
            self.error_message.clone(),
        ]
    }
}
