// sqlx::Error -> AppError mapping
//
// Lives here because of the orphan rule: core cannot depend on sqlx and we
// cannot implement From<sqlx::Error> for AppError in this crate.

use shelfwise_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            match db_err.code().as_deref() {
                // SQLite error codes: https://www.sqlite.org/rescode.html
                Some(code @ ("2067" | "1555")) => {
                    AppError::Conflict(format!("Unique constraint violation: {} ({})", message, code))
                }
                Some("5") => AppError::Database(format!("Database locked (SQLITE_BUSY): {}", message)),
                Some("13") => AppError::Database(format!("Database full: {}", message)),
                Some(code) => AppError::Database(format!("Database error [{}]: {}", code, message)),
                None => AppError::Database(format!("Database error: {}", message)),
            }
        }
        sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Database(format!("Column not found: {}", col)),
        _ => AppError::Database(err.to_string()),
    }
}

/// Decode a JSON column
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::Database(format!("Corrupt JSON in column {}: {}", column, e)))
}
