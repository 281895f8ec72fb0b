//! SQLite-backed record store.
//!
//! # Responsibility
//! - Persist normalized records as an entity table plus link adjacency rows.
//! - Keep SQL details behind the `RecordStore` contract.
//!
//! # Invariants
//! - Field values are stored as JSON text.
//! - List links keep order through `record_link_targets.position`.
//! - Multi-row writes for one record run in one immediate transaction.

use super::{RecordStore, StoreError, StoreResult};
use crate::db::migrations::{latest_version, schema_version};
use crate::model::record::{Link, Record, RecordId};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::Value;

const REQUIRED_TABLES: [&str; 4] = [
    "records",
    "record_fields",
    "record_links",
    "record_link_targets",
];

/// Record store over a migrated SQLite connection.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Creates a store from a connection opened via `open_db*`.
    ///
    /// # Errors
    /// - `InvalidData` when the schema version or required tables are missing.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn begin(&self) -> StoreResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn exists(&self, id: &RecordId) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1);",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn get(&self, id: &RecordId) -> StoreResult<Option<Record>> {
        let typename: Option<String> = self
            .conn
            .query_row(
                "SELECT typename FROM records WHERE id = ?1;",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(typename) = typename else {
            return Ok(None);
        };

        let mut record = Record::new(id.clone(), typename);

        let mut stmt = self
            .conn
            .prepare("SELECT name, value_json FROM record_fields WHERE record_id = ?1;")?;
        let mut rows = stmt.query([id.as_str()])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let text: String = row.get(1)?;
            let value = serde_json::from_str::<Value>(&text).map_err(|err| {
                StoreError::InvalidData(format!(
                    "invalid json in record_fields.value_json for `{id}.{name}`: {err}"
                ))
            })?;
            record.fields.insert(name, value);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT name, kind FROM record_links WHERE record_id = ?1;")?;
        let mut rows = stmt.query([id.as_str()])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let link = match kind.as_str() {
                "one" => Link::One(None),
                "many" => Link::Many(Vec::new()),
                other => {
                    return Err(StoreError::InvalidData(format!(
                        "invalid link kind `{other}` in record_links.kind"
                    )));
                }
            };
            record.links.insert(name, link);
        }

        let mut stmt = self.conn.prepare(
            "SELECT name, target_id
             FROM record_link_targets
             WHERE record_id = ?1
             ORDER BY name ASC, position ASC;",
        )?;
        let mut rows = stmt.query([id.as_str()])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let target = RecordId::new(row.get::<_, String>(1)?);
            match record.links.get_mut(&name) {
                Some(Link::One(slot)) => *slot = Some(target),
                Some(Link::Many(targets)) => targets.push(target),
                None => {
                    return Err(StoreError::InvalidData(format!(
                        "link target without link row for `{id}.{name}`"
                    )));
                }
            }
        }

        Ok(Some(record))
    }

    fn insert(&mut self, record: Record) -> StoreResult<Option<Record>> {
        let previous = self.get(&record.id)?;
        let tx = self.begin()?;
        tx.execute(
            "INSERT INTO records (id, typename) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                typename = excluded.typename,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![record.id.as_str(), record.typename],
        )?;
        tx.execute(
            "DELETE FROM record_fields WHERE record_id = ?1;",
            [record.id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM record_links WHERE record_id = ?1;",
            [record.id.as_str()],
        )?;
        for (name, value) in &record.fields {
            write_field(&tx, &record.id, name, value)?;
        }
        for (name, link) in &record.links {
            write_link(&tx, &record.id, name, link)?;
        }
        tx.commit()?;
        Ok(previous)
    }

    fn delete(&mut self, id: &RecordId) -> StoreResult<Option<Record>> {
        let previous = self.get(id)?;
        if previous.is_some() {
            self.conn
                .execute("DELETE FROM records WHERE id = ?1;", [id.as_str()])?;
        }
        Ok(previous)
    }

    fn set_field(&mut self, id: &RecordId, name: &str, value: Value) -> StoreResult<bool> {
        if !self.exists(id)? {
            return Ok(false);
        }
        let tx = self.begin()?;
        delete_link(&tx, id, name)?;
        write_field(&tx, id, name, &value)?;
        touch(&tx, id)?;
        tx.commit()?;
        Ok(true)
    }

    fn set_link(&mut self, id: &RecordId, name: &str, link: Link) -> StoreResult<bool> {
        if !self.exists(id)? {
            return Ok(false);
        }
        let tx = self.begin()?;
        delete_field(&tx, id, name)?;
        delete_link(&tx, id, name)?;
        write_link(&tx, id, name, &link)?;
        touch(&tx, id)?;
        tx.commit()?;
        Ok(true)
    }

    fn unset(&mut self, id: &RecordId, name: &str) -> StoreResult<bool> {
        let tx = self.begin()?;
        let removed = delete_field(&tx, id, name)? + delete_link(&tx, id, name)?;
        if removed > 0 {
            touch(&tx, id)?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    fn ids(&self) -> StoreResult<Vec<RecordId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM records ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(RecordId::new(row.get::<_, String>(0)?));
        }
        Ok(ids)
    }

    fn contains(&self, id: &RecordId) -> StoreResult<bool> {
        self.exists(id)
    }
}

fn write_field(conn: &Connection, id: &RecordId, name: &str, value: &Value) -> StoreResult<()> {
    let text = serde_json::to_string(value).map_err(|err| {
        StoreError::InvalidData(format!("cannot encode field `{id}.{name}`: {err}"))
    })?;
    conn.execute(
        "INSERT INTO record_fields (record_id, name, value_json) VALUES (?1, ?2, ?3)
         ON CONFLICT(record_id, name) DO UPDATE SET value_json = excluded.value_json;",
        params![id.as_str(), name, text],
    )?;
    Ok(())
}

fn write_link(conn: &Connection, id: &RecordId, name: &str, link: &Link) -> StoreResult<()> {
    let kind = match link {
        Link::One(_) => "one",
        Link::Many(_) => "many",
    };
    conn.execute(
        "INSERT INTO record_links (record_id, name, kind) VALUES (?1, ?2, ?3);",
        params![id.as_str(), name, kind],
    )?;
    for (position, target) in link.targets().iter().enumerate() {
        conn.execute(
            "INSERT INTO record_link_targets (record_id, name, position, target_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![id.as_str(), name, position as i64, target.as_str()],
        )?;
    }
    Ok(())
}

fn delete_field(conn: &Connection, id: &RecordId, name: &str) -> StoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM record_fields WHERE record_id = ?1 AND name = ?2;",
        params![id.as_str(), name],
    )?)
}

fn delete_link(conn: &Connection, id: &RecordId, name: &str) -> StoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM record_links WHERE record_id = ?1 AND name = ?2;",
        params![id.as_str(), name],
    )?)
}

fn touch(conn: &Connection, id: &RecordId) -> StoreResult<()> {
    conn.execute(
        "UPDATE records
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1;",
        [id.as_str()],
    )?;
    Ok(())
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::InvalidData(format!(
            "record store requires schema version {expected_version}, got {actual_version}"
        )));
    }

    for table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(StoreError::InvalidData(format!(
                "record store requires table `{table}`"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SqliteRecordStore;
    use crate::db::open_db_in_memory;
    use crate::model::record::{Link, Record, RecordId};
    use crate::store::RecordStore;
    use rusqlite::Connection;
    use serde_json::json;

    #[test]
    fn record_survives_persistence_with_link_order() {
        let conn = open_db_in_memory().unwrap();
        let mut store = SqliteRecordStore::try_new(&conn).unwrap();

        let record = Record::new(RecordId::from("g1"), "RetroReflectionGroup")
            .with_field("sortOrder", 2.5)
            .with_field("voterIds", json!(["u1", "u2"]))
            .with_link(
                "reflections",
                Link::Many(vec![RecordId::from("r2"), RecordId::from("r1")]),
            )
            .with_link("meeting", Link::One(None));
        assert!(store.insert(record.clone()).unwrap().is_none());

        let loaded = store.get(&RecordId::from("g1")).unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn field_write_replaces_link_of_same_name() {
        let conn = open_db_in_memory().unwrap();
        let mut store = SqliteRecordStore::try_new(&conn).unwrap();
        let id = RecordId::from("g1");
        store
            .insert(
                Record::new(id.clone(), "RetroReflectionGroup")
                    .with_link("reflections", Link::Many(vec![RecordId::from("r1")])),
            )
            .unwrap();

        assert!(store.set_field(&id, "reflections", json!(null)).unwrap());
        let loaded = store.get(&id).unwrap().unwrap();
        assert!(loaded.link("reflections").is_none());
        assert!(store.unset(&id, "reflections").unwrap());
        assert!(!store.unset(&id, "reflections").unwrap());
    }

    #[test]
    fn delete_cascades_to_link_rows() {
        let conn = open_db_in_memory().unwrap();
        let mut store = SqliteRecordStore::try_new(&conn).unwrap();
        let id = RecordId::from("m1");
        store
            .insert(
                Record::new(id.clone(), "RetrospectiveMeeting")
                    .with_link("reflectionGroups", Link::Many(vec![RecordId::from("g1")])),
            )
            .unwrap();

        assert!(store.delete(&id).unwrap().is_some());
        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM record_link_targets;", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(orphans, 0);
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(SqliteRecordStore::try_new(&conn).is_err());
    }
}
