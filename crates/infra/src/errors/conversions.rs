//! Conversions from external infrastructure errors into domain errors.

use rusqlite::Error as SqlError;
use tideline_domain::TidelineError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TidelineError);

impl From<InfraError> for TidelineError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TidelineError> for InfraError {
    fn from(value: TidelineError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoTidelineError {
    fn into_tideline(self) -> TidelineError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TidelineError */
/* -------------------------------------------------------------------------- */

impl IntoTidelineError for SqlError {
    fn into_tideline(self) -> TidelineError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        TidelineError::Storage("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        TidelineError::Storage("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        TidelineError::Storage("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        TidelineError::Storage("foreign key constraint violation".into())
                    }
                    _ => TidelineError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TidelineError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TidelineError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                TidelineError::Storage(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                TidelineError::Storage("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                TidelineError::Storage(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => TidelineError::Storage(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => TidelineError::Storage("invalid SQL query".into()),
            other => TidelineError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_tideline())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → TidelineError */
/* -------------------------------------------------------------------------- */

impl IntoTidelineError for r2d2::Error {
    fn into_tideline(self) -> TidelineError {
        TidelineError::Storage(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_tideline())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → TidelineError */
/* -------------------------------------------------------------------------- */

/// Map a blocking-task join failure into the domain error.
pub fn map_join_error(err: JoinError) -> TidelineError {
    if err.is_cancelled() {
        TidelineError::Internal("blocking task cancelled".into())
    } else {
        TidelineError::Internal(format!("blocking task failed: {err}"))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
