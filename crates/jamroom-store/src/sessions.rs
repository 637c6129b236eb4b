use chrono::Utc;
use rusqlite::types::ToSql;
use tracing::instrument;

use jamroom_core::{GenreFilter, SessionRecord, Visibility};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Append-only repository of session documents.
#[derive(Clone)]
pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persist a record and its genre tags in one transaction.
    #[instrument(skip(self, record), fields(session_id = %record.session_id))]
    pub fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let document = serde_json::to_string(record)?;
        let visibility = record.visibility().to_string();
        let genres = record.genres();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let _ = tx.execute(
                "INSERT INTO sessions (session_id, visibility, document, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![record.session_id.as_str(), visibility, document, now],
            )?;
            let rowid = tx.last_insert_rowid();
            {
                let mut stmt =
                    tx.prepare("INSERT INTO session_genres (session_rowid, tag) VALUES (?1, ?2)")?;
                for tag in &genres {
                    let _ = stmt.execute(rusqlite::params![rowid, tag])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// All public sessions passing the genre filter. No defined order.
    #[instrument(skip(self))]
    pub fn find_public(&self, filter: &GenreFilter) -> Result<Vec<SessionRecord>, StoreError> {
        let public = Visibility::Public.to_string();
        let (sql, tags): (String, Vec<&String>) = match filter {
            GenreFilter::NoFilter => (
                "SELECT s.document FROM sessions s WHERE s.visibility = ?1".to_string(),
                Vec::new(),
            ),
            GenreFilter::SingleTag(tag) => (
                "SELECT s.document FROM sessions s
                 WHERE s.visibility = ?1
                   AND EXISTS (SELECT 1 FROM session_genres g
                               WHERE g.session_rowid = s.id AND g.tag = ?2)"
                    .to_string(),
                vec![tag],
            ),
            GenreFilter::ManyTags(tags) if tags.is_empty() => return Ok(Vec::new()),
            GenreFilter::ManyTags(tags) => (
                format!(
                    "SELECT s.document FROM sessions s
                     WHERE s.visibility = ?1
                       AND EXISTS (SELECT 1 FROM session_genres g
                                   WHERE g.session_rowid = s.id AND g.tag IN ({}))",
                    row_helpers::placeholders(2, tags.len())
                ),
                tags.iter().collect(),
            ),
        };

        self.db.with_conn(|conn| {
            let mut params: Vec<&dyn ToSql> = Vec::with_capacity(tags.len() + 1);
            params.push(&public);
            for tag in &tags {
                params.push(*tag);
            }

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params.as_slice())?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let raw: String = row_helpers::get(row, 0, "sessions", "document")?;
                results.push(row_helpers::parse_document(&raw, "sessions", "document")?);
            }
            Ok(results)
        })
    }
}
