//! Conversions from external infrastructure errors into domain errors.

use calbridge_domain::CalbridgeError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CalbridgeError);

impl From<InfraError> for CalbridgeError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CalbridgeError> for InfraError {
    fn from(value: CalbridgeError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCalbridgeError {
    fn into_calbridge(self) -> CalbridgeError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CalbridgeError */
/* -------------------------------------------------------------------------- */

impl IntoCalbridgeError for SqlError {
    fn into_calbridge(self) -> CalbridgeError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => CalbridgeError::Database("database is busy".into()),
                    (ErrorCode::DatabaseLocked, _) => {
                        CalbridgeError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        CalbridgeError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        CalbridgeError::Database("foreign key constraint violation".into())
                    }
                    _ => CalbridgeError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CalbridgeError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CalbridgeError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CalbridgeError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => CalbridgeError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidParameterName(parameter_name) => {
                CalbridgeError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => CalbridgeError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => CalbridgeError::Database("invalid SQL query".into()),
            other => CalbridgeError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_calbridge())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → CalbridgeError */
/* -------------------------------------------------------------------------- */

impl IntoCalbridgeError for r2d2::Error {
    fn into_calbridge(self) -> CalbridgeError {
        CalbridgeError::Database(format!("connection pool exhausted: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_calbridge())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CalbridgeError */
/* -------------------------------------------------------------------------- */

impl IntoCalbridgeError for HttpError {
    fn into_calbridge(self) -> CalbridgeError {
        if self.is_timeout() {
            CalbridgeError::Network(format!("request timed out: {self}"))
        } else if self.is_connect() {
            CalbridgeError::Network(format!("connection failed: {self}"))
        } else if self.is_decode() {
            CalbridgeError::InvalidInput(format!("malformed response body: {self}"))
        } else if self.is_builder() {
            CalbridgeError::Internal(format!("request could not be built: {self}"))
        } else {
            CalbridgeError::Network(self.to_string())
        }
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_calbridge())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → CalbridgeError */
/* -------------------------------------------------------------------------- */

impl IntoCalbridgeError for serde_json::Error {
    fn into_calbridge(self) -> CalbridgeError {
        CalbridgeError::InvalidInput(format!("invalid JSON: {self}"))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(value.into_calbridge())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio task join errors → CalbridgeError */
/* -------------------------------------------------------------------------- */

impl IntoCalbridgeError for tokio::task::JoinError {
    fn into_calbridge(self) -> CalbridgeError {
        CalbridgeError::Internal(format!("blocking task failed: {self}"))
    }
}

impl From<tokio::task::JoinError> for InfraError {
    fn from(value: tokio::task::JoinError) -> Self {
        InfraError(value.into_calbridge())
    }
}
