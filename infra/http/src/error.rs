use keel_domain::error::{DomainError, ErrorKind};
use std::borrow::Cow;

/// A specialized [`HttpError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Validation errors.
    #[error("Validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Transport-level failures (connect, timeout, body I/O).
    #[error("Request failed{}: {source}", format_context(.context))]
    Request {
        #[source]
        source: reqwest::Error,
        context: Option<Cow<'static, str>>,
    },

    /// The upstream answered with an error status.
    #[error("Upstream returned {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The success body did not decode into the expected shape.
    #[error("Response decoding failed{}: {source}", format_context(.context))]
    Decode {
        #[source]
        source: reqwest::Error,
        context: Option<Cow<'static, str>>,
    },
}

impl HttpError {
    /// Classifies this failure for the outward error taxonomy.
    #[must_use]
    pub fn classify(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::InvalidInput,
            Self::Request { source, .. } => {
                if source.is_timeout() || source.is_connect() {
                    ErrorKind::Unavailable
                } else {
                    ErrorKind::Internal
                }
            }
            Self::Status { status, .. } => classify_status(*status),
            Self::Decode { .. } => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(source: reqwest::Error) -> Self {
        Self::Request { source, context: None }
    }
}

impl From<HttpError> for DomainError {
    fn from(err: HttpError) -> Self {
        Self::new(err.classify(), err.to_string())
    }
}

/// Maps an upstream status code onto the domain taxonomy.
const fn classify_status(status: u16) -> ErrorKind {
    match status {
        404 | 410 => ErrorKind::NotFound,
        409 => ErrorKind::AlreadyExists,
        400 | 422 => ErrorKind::InvalidInput,
        401 | 403 => ErrorKind::Unauthorized,
        408 | 429 | 502..=504 => ErrorKind::Unavailable,
        _ => ErrorKind::Internal,
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_the_taxonomy() {
        assert_eq!(classify_status(404), ErrorKind::NotFound);
        assert_eq!(classify_status(409), ErrorKind::AlreadyExists);
        assert_eq!(classify_status(422), ErrorKind::InvalidInput);
        assert_eq!(classify_status(401), ErrorKind::Unauthorized);
        assert_eq!(classify_status(429), ErrorKind::Unavailable);
        assert_eq!(classify_status(503), ErrorKind::Unavailable);
        // Anything unclassified falls back to internal.
        assert_eq!(classify_status(500), ErrorKind::Internal);
        assert_eq!(classify_status(418), ErrorKind::Internal);
    }

    #[test]
    fn status_errors_convert_to_domain_errors() {
        let err = HttpError::Status { status: 404, detail: "no such session".to_owned() };
        let domain: DomainError = err.into();
        assert_eq!(domain.kind, ErrorKind::NotFound);
        assert!(domain.message.contains("404"));
    }
}
