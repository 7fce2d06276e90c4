use keel_domain::error::{DomainError, ErrorKind};
use sqlx::error::ErrorKind as SqlxErrorKind;
use std::borrow::Cow;

/// A specialized [`StoreError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Validation errors.
    #[error("Validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Occurs when connectivity or health checks fail.
    #[error("Store connection failed{}: {message}", format_context(.context))]
    Connection { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A wrapper for underlying driver errors.
    #[error("Store error{}: {source}", format_context(.context))]
    Sqlx {
        #[source]
        source: sqlx::Error,
        context: Option<Cow<'static, str>>,
    },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal store error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl StoreError {
    fn set_context(&mut self, ctx: Cow<'static, str>) {
        match self {
            Self::Validation { context, .. }
            | Self::Connection { context, .. }
            | Self::Sqlx { context, .. }
            | Self::Internal { context, .. } => *context = Some(ctx),
        }
    }

    /// Classifies this failure for the outward error taxonomy.
    #[must_use]
    pub fn classify(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::InvalidInput,
            Self::Connection { .. } => ErrorKind::Unavailable,
            Self::Sqlx { source, .. } => classify_sqlx(source),
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(source: sqlx::Error) -> Self {
        Self::Sqlx { source, context: None }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        Self::new(err.classify(), err.to_string())
    }
}

/// Maps a driver error onto the domain taxonomy at the access boundary.
fn classify_sqlx(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::Database(db) => match db.kind() {
            SqlxErrorKind::UniqueViolation => ErrorKind::AlreadyExists,
            SqlxErrorKind::ForeignKeyViolation
            | SqlxErrorKind::NotNullViolation
            | SqlxErrorKind::CheckViolation => ErrorKind::InvalidInput,
            _ => ErrorKind::Internal,
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ErrorKind::Unavailable
        }
        _ => ErrorKind::Internal,
    }
}

/// Attaches call-site context to store results.
pub trait StoreErrorExt<T> {
    /// Wraps the error with a short description of the failing operation.
    ///
    /// # Errors
    /// Propagates the original error with context attached.
    fn context(self, ctx: impl Into<Cow<'static, str>>) -> Result<T, StoreError>;
}

impl<T, E: Into<StoreError>> StoreErrorExt<T> for Result<T, E> {
    fn context(self, ctx: impl Into<Cow<'static, str>>) -> Result<T, StoreError> {
        self.map_err(|e| {
            let mut err = e.into();
            err.set_context(ctx.into());
            err
        })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_classifies_as_not_found() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.classify(), ErrorKind::NotFound);
    }

    #[test]
    fn pool_failures_classify_as_unavailable() {
        assert_eq!(StoreError::from(sqlx::Error::PoolClosed).classify(), ErrorKind::Unavailable);
        assert_eq!(StoreError::from(sqlx::Error::PoolTimedOut).classify(), ErrorKind::Unavailable);
    }

    #[test]
    fn context_is_attached_and_displayed() {
        let res: Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let err = res.context("loading entity").unwrap_err();
        assert!(err.to_string().contains("(loading entity)"), "{err}");
    }

    #[test]
    fn domain_conversion_keeps_the_kind() {
        let domain: DomainError = StoreError::from(sqlx::Error::RowNotFound).into();
        assert_eq!(domain.kind, ErrorKind::NotFound);
    }
}
