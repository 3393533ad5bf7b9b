use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;

/// A dashboard account joined with its role code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: i64,
    pub login: String,
    pub password_hash: String,
    pub role_code: Option<String>,
    pub manid: Option<i64>,
    pub is_active: bool,
    pub is_superuser: bool,
}

/// Fields needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub login: &'a str,
    pub password_hash: &'a str,
    pub role_code: Option<&'a str>,
    pub manid: Option<i64>,
    pub is_superuser: bool,
}

pub(crate) const USER_COLUMNS: &str =
    "u.keyid, u.login, u.password_hash, r.code, u.manid, u.status, u.is_superuser";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        user_id: row.get(0)?,
        login: row.get(1)?,
        password_hash: row.get(2)?,
        role_code: row.get(3)?,
        manid: row.get(4)?,
        is_active: row.get(5)?,
        is_superuser: row.get(6)?,
    })
}

pub fn find_user_by_login(
    conn: &Connection,
    login: &str,
) -> Result<Option<UserRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u
         LEFT JOIN roles r ON r.keyid = u.role_id
         WHERE u.login = ?1"
    );
    let user = conn
        .query_row(&sql, params![login], user_from_row)
        .optional()?;
    Ok(user)
}

/// Insert a user. An unknown role code is rejected rather than stored as NULL.
pub fn insert_user(conn: &Connection, user: &NewUser<'_>) -> Result<i64, DatabaseError> {
    let role_id: Option<i64> = match user.role_code {
        Some(code) => Some(
            conn.query_row(
                "SELECT keyid FROM roles WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DatabaseError::InvalidEnum {
                field: "role".into(),
                value: code.to_string(),
            })?,
        ),
        None => None,
    };

    conn.execute(
        "INSERT INTO users (login, password_hash, role_id, manid, is_superuser)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.login,
            user.password_hash,
            role_id,
            user.manid,
            user.is_superuser
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
pub(crate) fn set_user_active(conn: &Connection, user_id: i64, active: bool) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE users SET status = ?1 WHERE keyid = ?2",
        params![active, user_id],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "user".into(),
            id: user_id.to_string(),
        });
    }
    Ok(())
}

pub fn touch_last_login(conn: &Connection, user_id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET last_login = datetime('now') WHERE keyid = ?1",
        params![user_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn doctor(login: &str) -> NewUser<'_> {
        NewUser {
            login,
            password_hash: "hash",
            role_code: Some("doctor"),
            manid: Some(42),
            is_superuser: false,
        }
    }

    #[test]
    fn insert_and_find_by_login() {
        let conn = open_memory_database().unwrap();
        let id = insert_user(&conn, &doctor("ivanova")).unwrap();

        let user = find_user_by_login(&conn, "ivanova").unwrap().unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.role_code.as_deref(), Some("doctor"));
        assert_eq!(user.manid, Some(42));
        assert!(user.is_active);
        assert!(!user.is_superuser);
    }

    #[test]
    fn find_missing_login_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(find_user_by_login(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn user_without_role_has_no_code() {
        let conn = open_memory_database().unwrap();
        insert_user(
            &conn,
            &NewUser {
                login: "root",
                password_hash: "hash",
                role_code: None,
                manid: None,
                is_superuser: true,
            },
        )
        .unwrap();
        let user = find_user_by_login(&conn, "root").unwrap().unwrap();
        assert!(user.role_code.is_none());
        assert!(user.is_superuser);
    }

    #[test]
    fn unknown_role_rejected() {
        let conn = open_memory_database().unwrap();
        let mut user = doctor("x");
        user.role_code = Some("janitor");
        let err = insert_user(&conn, &user).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn duplicate_login_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        insert_user(&conn, &doctor("dup")).unwrap();
        let err = insert_user(&conn, &doctor("dup")).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn deactivate_user() {
        let conn = open_memory_database().unwrap();
        let id = insert_user(&conn, &doctor("petrov")).unwrap();
        set_user_active(&conn, id, false).unwrap();
        assert!(!find_user_by_login(&conn, "petrov").unwrap().unwrap().is_active);
        assert!(set_user_active(&conn, 999, false).is_err());
    }
}
