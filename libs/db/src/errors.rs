//! Shared database error helpers (SQLSTATE categorization, etc.)

/// Returns true if the given code represents a unique constraint violation
/// across popular backends (Postgres 23505, SQLite 2067/1555, MySQL 1062).
pub fn is_unique_violation_code(code: &str) -> bool {
    matches!(code, "23505" | "2067" | "1555" | "1062")
}

pub fn is_sqlx_unique_violation(db: &dyn sqlx::error::DatabaseError) -> bool {
    db.is_unique_violation()
        || db
            .code()
            .map(|c| is_unique_violation_code(c.as_ref()))
            .unwrap_or(false)
}

/// Convenience over a whole `sqlx::Error`.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => is_sqlx_unique_violation(db.as_ref()),
        _ => false,
    }
}
