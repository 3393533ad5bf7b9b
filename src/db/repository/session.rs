use rusqlite::{params, Connection, OptionalExtension};

use super::user::{user_from_row, UserRecord, USER_COLUMNS};
use crate::db::DatabaseError;

/// Store a login session keyed by the SHA-256 of its bearer token.
pub fn insert_session(
    conn: &Connection,
    token_hash: &[u8; 32],
    user_id: i64,
    ttl_hours: u32,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO user_sessions (token_hash, user_id, expires_at)
         VALUES (?1, ?2, datetime('now', ?3))",
        params![
            token_hash.as_slice(),
            user_id,
            format!("+{ttl_hours} hours")
        ],
    )?;
    Ok(())
}

/// Resolve an unexpired session to its (active) user.
pub fn find_session_user(
    conn: &Connection,
    token_hash: &[u8; 32],
) -> Result<Option<UserRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM user_sessions s
         JOIN users u ON u.keyid = s.user_id
         LEFT JOIN roles r ON r.keyid = u.role_id
         WHERE s.token_hash = ?1
           AND s.expires_at > datetime('now')
           AND u.status = 1"
    );
    let user = conn
        .query_row(&sql, params![token_hash.as_slice()], user_from_row)
        .optional()?;
    Ok(user)
}

pub fn delete_session(conn: &Connection, token_hash: &[u8; 32]) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM user_sessions WHERE token_hash = ?1",
        params![token_hash.as_slice()],
    )?;
    Ok(deleted > 0)
}

pub fn prune_expired_sessions(conn: &Connection) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM user_sessions WHERE expires_at <= datetime('now')",
        [],
    )?;
    Ok(deleted)
}
