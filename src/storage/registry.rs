//! Document Registry
//!
//! Durable index from document id to its current machine-written state.
//! The registry is a cache derived from the version store: every write goes
//! through a commit transaction that also appends a version record, and the
//! whole table can be rebuilt from history (see `consistency`).

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, params};

use super::database::SharedDatabase;
use crate::types::{
    DocError, Document, DocumentId, DocumentMeta, Result, format_timestamp, parse_timestamp,
};

const SELECT_COLUMNS: &str = "id, title, doc_type, collection, repo_ref, file_path, outline,
     cross_refs, content, content_hash, revision, generated_at, created_at, human_edited";

/// Raw column values, converted into a `Document` outside the rusqlite closure
/// so malformed values surface as `RegistryCorruption`.
struct RawRow {
    id: String,
    title: String,
    doc_type: String,
    collection: String,
    repo_ref: String,
    file_path: String,
    outline: String,
    cross_refs: String,
    content: String,
    content_hash: String,
    revision: String,
    generated_at: String,
    created_at: String,
    human_edited: bool,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            doc_type: row.get(2)?,
            collection: row.get(3)?,
            repo_ref: row.get(4)?,
            file_path: row.get(5)?,
            outline: row.get(6)?,
            cross_refs: row.get(7)?,
            content: row.get(8)?,
            content_hash: row.get(9)?,
            revision: row.get(10)?,
            generated_at: row.get(11)?,
            created_at: row.get(12)?,
            human_edited: row.get(13)?,
        })
    }

    fn into_document(self, dependencies: BTreeSet<String>) -> Result<Document> {
        let corrupt = |what: &str, e: DocError| {
            DocError::RegistryCorruption(format!("row '{}': bad {}: {}", self.id, what, e))
        };

        let id = DocumentId::parse(&self.id).map_err(|e| corrupt("id", e))?;
        let references: BTreeSet<String> = serde_json::from_str(&self.cross_refs)
            .map_err(|e| corrupt("cross_refs", DocError::Json(e)))?;
        let generated_at =
            parse_timestamp(&self.generated_at).map_err(|e| corrupt("generated_at", e))?;
        let created_at = parse_timestamp(&self.created_at).map_err(|e| corrupt("created_at", e))?;

        Ok(Document {
            id,
            meta: DocumentMeta {
                title: self.title,
                doc_type: self.doc_type,
                collection: self.collection,
                repo_ref: self.repo_ref,
                file_path: self.file_path,
                dependencies,
                references,
                outline: self.outline,
            },
            content: self.content,
            content_hash: self.content_hash,
            revision: self.revision,
            generated_at,
            created_at,
            human_edited: self.human_edited,
        })
    }
}

/// Registry access. Cheap to clone; all state lives in the database.
#[derive(Clone)]
pub struct DocumentRegistry {
    db: SharedDatabase,
}

impl DocumentRegistry {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &SharedDatabase {
        &self.db
    }

    pub fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        let conn = self.db.connection()?;
        Self::get_in(&conn, id)
    }

    pub fn get_in(conn: &Connection, id: &DocumentId) -> Result<Option<Document>> {
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", SELECT_COLUMNS),
                params![id.as_str()],
                RawRow::from_row,
            )
            .optional()?;

        match raw {
            Some(raw) => {
                let deps = Self::dependencies_in(conn, id.as_str())?;
                raw.into_document(deps).map(Some)
            }
            None => Ok(None),
        }
    }

    /// All registry rows ordered by id.
    ///
    /// Fails with `RegistryCorruption` on the first unreadable row.
    pub fn list(&self) -> Result<Vec<Document>> {
        let conn = self.db.connection()?;
        Self::list_in(&conn)
    }

    pub fn list_in(conn: &Connection) -> Result<Vec<Document>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let raws = stmt
            .query_map([], RawRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DocError::RegistryCorruption(format!("unreadable row: {}", e)))?;

        let mut documents = Vec::with_capacity(raws.len());
        for raw in raws {
            let deps = Self::dependencies_in(conn, &raw.id)?;
            documents.push(raw.into_document(deps)?);
        }
        Ok(documents)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.db.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Insert or replace a registry row together with its dependency edges.
    pub fn upsert_in(conn: &Connection, doc: &Document) -> Result<()> {
        let cross_refs = serde_json::to_string(&doc.meta.references)?;

        conn.execute(
            r#"INSERT INTO documents
               (id, title, doc_type, collection, repo_ref, file_path, outline, cross_refs,
                content, content_hash, revision, generated_at, created_at, human_edited)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
               ON CONFLICT(id) DO UPDATE SET
                   title = excluded.title,
                   doc_type = excluded.doc_type,
                   collection = excluded.collection,
                   repo_ref = excluded.repo_ref,
                   file_path = excluded.file_path,
                   outline = excluded.outline,
                   cross_refs = excluded.cross_refs,
                   content = excluded.content,
                   content_hash = excluded.content_hash,
                   revision = excluded.revision,
                   generated_at = excluded.generated_at,
                   human_edited = excluded.human_edited"#,
            params![
                doc.id.as_str(),
                doc.meta.title,
                doc.meta.doc_type,
                doc.meta.collection,
                doc.meta.repo_ref,
                doc.meta.file_path,
                doc.meta.outline,
                cross_refs,
                doc.content,
                doc.content_hash,
                doc.revision,
                format_timestamp(&doc.generated_at),
                format_timestamp(&doc.created_at),
                doc.human_edited,
            ],
        )?;

        Self::replace_dependencies_in(conn, &doc.id, &doc.meta.dependencies)
    }

    /// Replace the full edge set for one document.
    pub fn replace_dependencies_in(
        conn: &Connection,
        id: &DocumentId,
        dependencies: &BTreeSet<String>,
    ) -> Result<()> {
        conn.execute(
            "DELETE FROM document_dependencies WHERE document_id = ?1",
            params![id.as_str()],
        )?;

        let mut stmt = conn.prepare_cached(
            "INSERT INTO document_dependencies (document_id, source_path) VALUES (?1, ?2)",
        )?;
        for path in dependencies {
            stmt.execute(params![id.as_str(), path])?;
        }
        Ok(())
    }

    pub fn set_human_edited(&self, id: &DocumentId, edited: bool) -> Result<()> {
        let conn = self.db.connection()?;
        Self::set_human_edited_in(&conn, id, edited)
    }

    pub fn set_human_edited_in(conn: &Connection, id: &DocumentId, edited: bool) -> Result<()> {
        let updated = conn.execute(
            "UPDATE documents SET human_edited = ?1 WHERE id = ?2",
            params![edited, id.as_str()],
        )?;
        if updated == 0 {
            return Err(DocError::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Drop a registry row; edges cascade. Returns whether a row existed.
    pub fn remove_in(conn: &Connection, id: &DocumentId) -> Result<bool> {
        let removed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id.as_str()])?;
        Ok(removed > 0)
    }

    pub(crate) fn clear_in(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM document_dependencies", [])?;
        conn.execute("DELETE FROM documents", [])?;
        Ok(())
    }

    /// Every (document, source path) edge, ordered by document id.
    pub fn edges(&self) -> Result<Vec<(DocumentId, String)>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(
            "SELECT document_id, source_path FROM document_dependencies
             ORDER BY document_id, source_path",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, path)| {
                DocumentId::parse(&id)
                    .map(|id| (id, path))
                    .map_err(|e| DocError::RegistryCorruption(e.to_string()))
            })
            .collect()
    }

    fn dependencies_in(conn: &Connection, id: &str) -> Result<BTreeSet<String>> {
        let mut stmt = conn.prepare_cached(
            "SELECT source_path FROM document_dependencies WHERE document_id = ?1",
        )?;
        let deps = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::types::content_hash;
    use std::sync::Arc;

    fn registry() -> DocumentRegistry {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        DocumentRegistry::new(Arc::new(db))
    }

    fn sample(id: &str, deps: &[&str]) -> Document {
        let content = format!("# {}\n", id);
        let now = chrono::Utc::now();
        Document {
            id: DocumentId::parse(id).unwrap(),
            meta: DocumentMeta {
                title: id.to_string(),
                doc_type: "overview".to_string(),
                file_path: format!("{}.md", id),
                dependencies: deps.iter().map(|s| s.to_string()).collect(),
                references: ["other".to_string()].into_iter().collect(),
                ..Default::default()
            },
            content_hash: content_hash(content.as_bytes()),
            content,
            revision: "r1".to_string(),
            generated_at: now,
            created_at: now,
            human_edited: false,
        }
    }

    fn upsert(registry: &DocumentRegistry, doc: &Document) {
        registry
            .database()
            .transaction(|conn| DocumentRegistry::upsert_in(conn, doc))
            .unwrap();
    }

    #[test]
    fn test_upsert_and_get() {
        let registry = registry();
        let doc = sample("overview", &["README.md", "src/"]);
        upsert(&registry, &doc);

        let loaded = registry.get(&doc.id).unwrap().unwrap();
        assert_eq!(loaded.content, doc.content);
        assert_eq!(loaded.meta.dependencies, doc.meta.dependencies);
        assert_eq!(loaded.meta.references, doc.meta.references);
        assert!(loaded.hash_is_current());
    }

    #[test]
    fn test_upsert_replaces_edges() {
        let registry = registry();
        let mut doc = sample("overview", &["README.md", "src/"]);
        upsert(&registry, &doc);

        doc.meta.dependencies = ["docs/"].iter().map(|s| s.to_string()).collect();
        upsert(&registry, &doc);

        let edges = registry.edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].1, "docs/");
    }

    #[test]
    fn test_remove_cascades_edges() {
        let registry = registry();
        let doc = sample("overview", &["README.md"]);
        upsert(&registry, &doc);

        let removed = registry
            .database()
            .transaction(|conn| DocumentRegistry::remove_in(conn, &doc.id))
            .unwrap();
        assert!(removed);
        assert!(registry.get(&doc.id).unwrap().is_none());
        assert!(registry.edges().unwrap().is_empty());
    }

    #[test]
    fn test_set_human_edited_missing_document() {
        let registry = registry();
        let id = DocumentId::parse("ghost").unwrap();
        assert!(matches!(
            registry.set_human_edited(&id, true),
            Err(DocError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_row_reported() {
        let registry = registry();
        registry
            .database()
            .execute(
                "INSERT INTO documents (id, title, doc_type, file_path, content, content_hash,
                 revision, generated_at, created_at)
                 VALUES ('Bad Id', 't', 'd', 'f', 'c', 'h', 'r', 'not-a-time', 'x')",
                &[],
            )
            .unwrap();

        assert!(matches!(
            registry.list(),
            Err(DocError::RegistryCorruption(_))
        ));
    }
}
