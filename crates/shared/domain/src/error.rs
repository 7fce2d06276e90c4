use serde::Serialize;
use std::borrow::Cow;

/// Classification of a recoverable, expected-or-not failure surfaced to the
/// outer boundary. Anything a boundary cannot classify becomes [`Internal`].
///
/// [`Internal`]: ErrorKind::Internal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Unauthorized,
    Unavailable,
    Internal,
}

/// Outward severity signal attached to every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Caller-correctable condition; surfaced with full detail.
    Expected,
    /// Server-side failure; surfaced as a generic message only.
    Fault,
}

impl ErrorKind {
    /// Outward status code. The match is exhaustive, so the kind→status
    /// mapping stays total as kinds are added.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::InvalidInput => 422,
            Self::Unauthorized => 401,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }

    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::NotFound | Self::AlreadyExists | Self::InvalidInput | Self::Unauthorized => {
                Severity::Expected
            }
            Self::Unavailable | Self::Internal => Severity::Fault,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidInput => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error carrying the kind used to shape the outward response.
///
/// Carries no resource ownership; boundary crates convert their low-level
/// failures into this type at the access boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} error{}: {message}", format_context(.context))]
pub struct DomainError {
    pub kind: ErrorKind,
    pub message: Cow<'static, str>,
    pub context: Option<Cow<'static, str>>,
}

impl DomainError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self { kind, message: message.into(), context: None }
    }

    #[must_use]
    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn already_exists(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    #[must_use]
    pub fn unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[must_use]
    pub fn context(mut self, context: impl Into<Cow<'static, str>>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Status code for the outward boundary handler.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// Message safe to show to the caller. Faults never leak internal
    /// detail; expected conditions surface their message verbatim.
    #[must_use]
    pub fn public_message(&self) -> &str {
        match self.kind.severity() {
            Severity::Expected => &self.message,
            Severity::Fault => "internal failure",
        }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
