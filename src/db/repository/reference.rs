use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::DatabaseError;

/// `{id, name}` pair used to populate filter controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceEntry<K> {
    pub id: K,
    pub name: String,
}

/// Doctor roster, named doctors only, ordered by name.
pub fn list_doctors(conn: &Connection) -> Result<Vec<ReferenceEntry<i64>>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT manidmis, text FROM import_man
         WHERE text IS NOT NULL
         ORDER BY text",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ReferenceEntry {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_specializations(conn: &Connection) -> Result<Vec<ReferenceEntry<i64>>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT keyidmis, text FROM specialities ORDER BY text")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ReferenceEntry {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Distinct fact-side target codes with their display names.
pub fn list_target_codes(conn: &Connection) -> Result<Vec<ReferenceEntry<String>>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT stat_purpose_code, stat_purpose_name
         FROM stat_purpose_mapping
         ORDER BY stat_purpose_name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ReferenceEntry {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn doctor_name(conn: &Connection, manid: i64) -> Result<Option<String>, DatabaseError> {
    let name = conn
        .query_row(
            "SELECT text FROM import_man WHERE manidmis = ?1",
            params![manid],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();
    Ok(name)
}

#[cfg(test)]
pub(crate) fn seed_reference_data(conn: &Connection) {
    conn.execute_batch(
        "INSERT INTO specialities (keyidmis, text, code) VALUES
             (1, 'Therapy', 'THR'),
             (2, 'Cardiology', 'CRD');
         INSERT INTO purposes (code, text) VALUES
             (10, 'Consultation'),
             (20, 'Preventive exam');
         INSERT INTO stat_purpose_mapping (stat_purpose_code, stat_purpose_name, purpose_code) VALUES
             ('C1', 'Primary consultation', 10),
             ('C2', 'Follow-up consultation', 10),
             ('P1', 'Screening', 20);
         INSERT INTO import_man (manidmis, text, specid) VALUES
             (42, 'Ivanova A.', 1),
             (43, 'Petrov B.', 1),
             (77, 'Sidorov C.', 2),
             (99, NULL, 2);",
    )
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn doctors_skip_unnamed_and_sort_by_name() {
        let conn = open_memory_database().unwrap();
        seed_reference_data(&conn);
        let doctors = list_doctors(&conn).unwrap();
        let names: Vec<_> = doctors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Ivanova A.", "Petrov B.", "Sidorov C."]);
        assert_eq!(doctors[0].id, 42);
    }

    #[test]
    fn specializations_sorted() {
        let conn = open_memory_database().unwrap();
        seed_reference_data(&conn);
        let specs = list_specializations(&conn).unwrap();
        assert_eq!(specs[0].name, "Cardiology");
        assert_eq!(specs[1].id, 1);
    }

    #[test]
    fn target_codes_distinct_by_name() {
        let conn = open_memory_database().unwrap();
        seed_reference_data(&conn);
        let codes = list_target_codes(&conn).unwrap();
        let ids: Vec<_> = codes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C2", "C1", "P1"]);
    }

    #[test]
    fn doctor_name_lookup() {
        let conn = open_memory_database().unwrap();
        seed_reference_data(&conn);
        assert_eq!(doctor_name(&conn, 42).unwrap().as_deref(), Some("Ivanova A."));
        assert_eq!(doctor_name(&conn, 99).unwrap(), None);
        assert_eq!(doctor_name(&conn, 1000).unwrap(), None);
    }
}
