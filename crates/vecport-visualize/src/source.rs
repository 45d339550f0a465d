//! Where labeled vectors come from.

use std::path::Path;

use rusqlite::Connection;
use rusqlite::types::ValueRef;
use tracing::debug;

use crate::errors::{Result, VisualizeError};

/// Rows with a stored embedding, labeled by department.
pub const FETCH_QUERY: &str =
    "SELECT department, embedding FROM galactic_tickets WHERE embedding IS NOT NULL";

/// One fetched row.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledVector {
    /// Department, `None` when NULL.
    pub label: Option<String>,
    /// Decoded embedding.
    pub vector: Vec<f32>,
}

/// A closable supplier of labeled vectors.
pub trait VectorSource {
    /// Run the fetch query and decode every row.
    fn fetch_rows(&mut self) -> Result<Vec<LabeledVector>>;

    /// Release the underlying connection. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Convert a byte blob back to an f32 vector.
pub fn blob_to_f32_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Decode a stored vector: little-endian `f32` BLOB or a `[0.1, 0.2]` text
/// array.
pub fn decode_vector(row: usize, value: ValueRef<'_>) -> Result<Vec<f32>> {
    let decode_err = |reason: String| VisualizeError::Decode { row, reason };
    match value {
        ValueRef::Blob(bytes) => {
            if bytes.len() % 4 != 0 {
                return Err(decode_err(format!(
                    "blob length {} is not a multiple of 4",
                    bytes.len()
                )));
            }
            Ok(blob_to_f32_vec(bytes))
        }
        ValueRef::Text(text) => {
            let text = std::str::from_utf8(text).map_err(|e| decode_err(e.to_string()))?;
            serde_json::from_str::<Vec<f32>>(text.trim()).map_err(|e| decode_err(e.to_string()))
        }
        ValueRef::Null => Err(decode_err("NULL embedding".into())),
        ValueRef::Integer(_) | ValueRef::Real(_) => {
            Err(decode_err("scalar stored where a vector was expected".into()))
        }
    }
}

/// [`VectorSource`] over a `SQLite` database.
pub struct SqliteVectorSource {
    conn: Option<Connection>,
}

impl SqliteVectorSource {
    /// Open the database file. It must already exist.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!(path = %path.display(), "database opened");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an open connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }
}

impl VectorSource for SqliteVectorSource {
    fn fetch_rows(&mut self) -> Result<Vec<LabeledVector>> {
        let conn = self.conn.as_ref().ok_or(VisualizeError::Closed)?;
        let mut stmt = conn.prepare(FETCH_QUERY)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let label = row.get::<_, Option<String>>(0)?;
            let vector = decode_vector(out.len(), row.get_ref(1)?)?;
            out.push(LabeledVector { label, vector });
        }
        debug!(rows = out.len(), "vectors fetched");
        Ok(out)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| VisualizeError::Sqlite(e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn f32_slice_to_blob(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn open_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE galactic_tickets (id INTEGER PRIMARY KEY, department TEXT, embedding);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn blob_and_text_rows() {
        let conn = open_db();
        let _ = conn
            .execute(
                "INSERT INTO galactic_tickets (department, embedding) VALUES (?1, ?2)",
                params!["Engineering", f32_slice_to_blob(&[1.0, -0.5])],
            )
            .unwrap();
        let _ = conn
            .execute(
                "INSERT INTO galactic_tickets (department, embedding) VALUES (?1, ?2)",
                params![Option::<String>::None, "[0.25, 2]"],
            )
            .unwrap();
        let _ = conn
            .execute(
                "INSERT INTO galactic_tickets (department, embedding) VALUES ('Ops', NULL)",
                [],
            )
            .unwrap();

        let mut source = SqliteVectorSource::from_connection(conn);
        let rows = source.fetch_rows().unwrap();
        assert_eq!(
            rows,
            vec![
                LabeledVector {
                    label: Some("Engineering".into()),
                    vector: vec![1.0, -0.5],
                },
                LabeledVector {
                    label: None,
                    vector: vec![0.25, 2.0],
                },
            ]
        );
    }

    #[test]
    fn closed_source_refuses_fetch() {
        let mut source = SqliteVectorSource::from_connection(open_db());
        assert!(source.is_open());
        source.close().unwrap();
        source.close().unwrap();
        assert!(!source.is_open());
        assert!(matches!(source.fetch_rows(), Err(VisualizeError::Closed)));
    }

    #[test]
    fn missing_table_is_sqlite_error() {
        let conn = Connection::open_in_memory().unwrap();
        let mut source = SqliteVectorSource::from_connection(conn);
        assert!(matches!(source.fetch_rows(), Err(VisualizeError::Sqlite(_))));
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteVectorSource::open(&dir.path().join("none.db")).is_err());
    }

    #[test]
    fn decode_rejects_bad_values() {
        assert!(decode_vector(0, ValueRef::Blob(&[0, 0, 0])).is_err());
        assert!(decode_vector(0, ValueRef::Text(b"not json")).is_err());
        assert!(decode_vector(0, ValueRef::Integer(3)).is_err());
        assert!(matches!(
            decode_vector(7, ValueRef::Null),
            Err(VisualizeError::Decode { row: 7, .. })
        ));
    }

    #[test]
    fn decode_text_with_whitespace() {
        assert_eq!(
            decode_vector(0, ValueRef::Text(b" [1.5, -2] ")).unwrap(),
            vec![1.5, -2.0]
        );
    }
}
