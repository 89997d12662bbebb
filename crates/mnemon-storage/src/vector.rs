//! vec0 virtual index upkeep and KNN queries (sqlite-vec).
//!
//! `vec_embeddings.rowid` is always the `embeddings.rowid`, so the two
//! stay paired through UPSERTs. When the extension cannot initialize the
//! engine runs degraded: vector search returns empty, everything else
//! proceeds.

use rusqlite::ffi::sqlite3_auto_extension;
use rusqlite::Connection;
use tracing::{info, warn};

use mnemon_core::errors::StorageError;

/// Register sqlite-vec as an auto extension for every connection opened
/// after this call. Safe to call more than once.
pub fn register_vec_extension() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// True if the vec0 module is usable on this connection.
pub fn extension_available(conn: &Connection) -> bool {
    conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
        .is_ok()
}

/// Ensure `vec_embeddings` exists with the configured dimension,
/// recreating on mismatch and backfilling missing rows from
/// `embeddings`. Returns false when the extension is unavailable.
pub fn ensure_index(conn: &Connection, dimensions: usize) -> Result<bool, StorageError> {
    if !extension_available(conn) {
        warn!("sqlite-vec unavailable, vector search disabled");
        return Ok(false);
    }

    match existing_dimension(conn)? {
        Some(existing) if existing == dimensions => {}
        Some(existing) => {
            warn!(
                "vec_embeddings dimension {existing} != configured {dimensions}, recreating"
            );
            conn.execute_batch("DROP TABLE vec_embeddings;")?;
            create_index(conn, dimensions)?;
        }
        None => create_index(conn, dimensions)?,
    }

    let backfilled = backfill_missing(conn, dimensions)?;
    if backfilled > 0 {
        info!("backfilled {backfilled} vec_embeddings rows from embeddings");
    }
    Ok(true)
}

fn create_index(conn: &Connection, dimensions: usize) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE vec_embeddings USING vec0(
            embedding float[{dimensions}] distance_metric=cosine
        );"
    ))?;
    Ok(())
}

/// Parse the declared dimension out of `sqlite_master.sql`, or `None`
/// when the table does not exist.
fn existing_dimension(conn: &Connection) -> Result<Option<usize>, StorageError> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name='vec_embeddings'",
            [],
            |row| row.get(0),
        )
        .ok();
    let Some(sql) = sql else { return Ok(None) };

    let dim = sql
        .split("float[")
        .nth(1)
        .and_then(|rest| rest.split(']').next())
        .and_then(|digits| digits.trim().parse::<usize>().ok());
    Ok(dim)
}

/// Insert vec rows for any embedding of the right dimension that lacks
/// one. Returns the number of rows added.
fn backfill_missing(conn: &Connection, dimensions: usize) -> Result<usize, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.vector FROM embeddings e
         WHERE e.dimensions = ?1
           AND e.id NOT IN (SELECT rowid FROM vec_embeddings)",
    )?;
    let missing = stmt
        .query_map([dimensions as i64], |row| {
            let id: i64 = row.get(0)?;
            let vector: Vec<u8> = row.get(1)?;
            Ok((id, vector))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut insert =
        conn.prepare("INSERT INTO vec_embeddings(rowid, embedding) VALUES (?1, ?2)")?;
    let count = missing.len();
    for (id, vector) in missing {
        insert.execute(rusqlite::params![id, vector])?;
    }
    Ok(count)
}

/// Upsert the vec row paired with an `embeddings` row.
pub fn upsert_vec_row(conn: &Connection, rowid: i64, vector: &[f32]) -> Result<(), StorageError> {
    conn.execute("DELETE FROM vec_embeddings WHERE rowid = ?1", [rowid])?;
    conn.execute(
        "INSERT INTO vec_embeddings(rowid, embedding) VALUES (?1, ?2)",
        rusqlite::params![rowid, vec_to_blob(vector)],
    )?;
    Ok(())
}

pub fn delete_vec_row(conn: &Connection, rowid: i64) -> Result<(), StorageError> {
    conn.execute("DELETE FROM vec_embeddings WHERE rowid = ?1", [rowid])?;
    Ok(())
}

/// A vector hit: memory id + similarity in [0, 1].
#[derive(Debug, Clone)]
pub struct VecHit {
    pub memory_id: String,
    pub score: f64,
}

/// Cosine KNN over non-deleted memories. The join goes vec row →
/// embeddings.content_hash → live memory.
pub fn knn(
    conn: &Connection,
    query_vector: &[f32],
    limit: usize,
) -> Result<Vec<VecHit>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT m.id, v.distance
         FROM vec_embeddings v
         JOIN embeddings e ON e.id = v.rowid
         JOIN memories m ON m.content_hash = e.content_hash AND m.is_deleted = 0
         WHERE v.embedding MATCH ?1 AND v.k = ?2
         ORDER BY v.distance",
    )?;
    let hits = stmt
        .query_map(
            rusqlite::params![vec_to_blob(query_vector), limit as i64],
            |row| {
                let id: String = row.get(0)?;
                let distance: f64 = row.get(1)?;
                Ok((id, distance))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(hits
        .into_iter()
        .map(|(memory_id, distance)| VecHit {
            memory_id,
            // Cosine distance ∈ [0, 2] → similarity ∈ [0, 1].
            score: (1.0 - distance / 2.0).clamp(0.0, 1.0),
        })
        .collect())
}

/// Little-endian f32 bytes, the blob form vec0 accepts.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Inverse of `vec_to_blob`.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_round_trip() {
        let v = vec![0.1f32, -2.5, 3.25];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn test_dimension_parse() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE vec_embeddings (embedding TEXT); -- placeholder shape
             DROP TABLE vec_embeddings;",
        )
        .unwrap();
        // No table → None.
        assert_eq!(existing_dimension(&conn).unwrap(), None);
    }
}
