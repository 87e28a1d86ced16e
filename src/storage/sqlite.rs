//! SQLite-backed store for documents, chunks, conversations and messages
//!
//! Chunk embeddings are stored as little-endian `f32` blobs; a NULL embedding
//! means the embedding call failed at ingest time and the chunk does not
//! participate in retrieval until backfilled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::retrieval::{cosine_similarity, rank_matches, RetrievedMatch, VectorSearcher};
use crate::types::{Chunk, Conversation, Document, Message, Role, SourceRef};

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::storage(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                total_chunks INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                UNIQUE (document_id, chunk_index)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                sources TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    /// Insert a document record
    pub fn insert_document(&self, doc: &Document) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (id, filename, total_chunks, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                doc.id.to_string(),
                doc.filename,
                doc.total_chunks,
                doc.created_at
            ],
        )?;
        Ok(())
    }

    /// Insert chunks for a document in one transaction
    pub fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks (id, document_id, chunk_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    chunk.id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.chunk_index,
                    chunk.content,
                    chunk.embedding.as_deref().map(embedding_to_blob),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, filename, total_chunks, created_at FROM documents WHERE id = ?1",
            params![id.to_string()],
            row_to_document,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List all documents, newest first
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, filename, total_chunks, created_at FROM documents ORDER BY created_at DESC",
        )?;
        let docs = stmt
            .query_map([], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    /// Delete a document; cascades to chunks, conversations and messages
    pub fn delete_document(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM documents WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    /// Create a conversation
    pub fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (id, document_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                conversation.id.to_string(),
                conversation.document_id.to_string(),
                conversation.created_at
            ],
        )?;
        Ok(())
    }

    /// Get a conversation by ID
    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, document_id, created_at FROM conversations WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(Conversation {
                    id: parse_uuid(row.get::<_, String>(0)?)?,
                    document_id: parse_uuid(row.get::<_, String>(1)?)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Insert a message
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let sources = message
            .sources
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, sources, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.role.as_str(),
                message.content,
                sources,
                message.created_at
            ],
        )?;
        Ok(())
    }

    /// List a conversation's messages in chronological order
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, sources, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC",
        )?;
        let messages = stmt
            .query_map(params![conversation_id.to_string()], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Load all embedded chunks for a document
    fn embedded_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, chunk_index, content, embedding
             FROM chunks WHERE document_id = ?1 AND embedding IS NOT NULL
             ORDER BY chunk_index ASC",
        )?;
        let chunks = stmt
            .query_map(params![document_id.to_string()], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    /// List chunks whose embedding is absent, in ingestion order
    pub fn chunks_missing_embedding(&self, limit: usize) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, chunk_index, content, embedding
             FROM chunks WHERE embedding IS NULL
             ORDER BY document_id, chunk_index ASC LIMIT ?1",
        )?;
        let chunks = stmt
            .query_map(params![limit as i64], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    /// Backfill a chunk's missing embedding
    ///
    /// Only fills NULL embeddings; chunk rows are otherwise immutable.
    pub fn backfill_embedding(&self, chunk_id: Uuid, embedding: &[f32]) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE chunks SET embedding = ?1 WHERE id = ?2 AND embedding IS NULL",
            params![embedding_to_blob(embedding), chunk_id.to_string()],
        )?;
        Ok(updated > 0)
    }

    /// Count all chunks for a document, embedded or not
    pub fn chunk_count(&self, document_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorSearcher for SqliteStore {
    /// Brute-force cosine scan over the document's embedded chunks
    async fn search(
        &self,
        query_embedding: &[f32],
        document_id: Uuid,
        k: usize,
    ) -> Result<Vec<RetrievedMatch>> {
        let chunks = self
            .embedded_chunks(document_id)
            .map_err(|e| Error::Retrieval(e.to_string()))?;

        let mut matches: Vec<RetrievedMatch> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_deref()?;
                Some(RetrievedMatch {
                    chunk_id: chunk.id,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    similarity: cosine_similarity(query_embedding, embedding),
                })
            })
            .collect();

        rank_matches(&mut matches, k);
        Ok(matches)
    }
}

/// Encode an embedding as a little-endian f32 blob
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 blob back into an embedding
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

fn parse_uuid(s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: parse_uuid(row.get::<_, String>(0)?)?,
        filename: row.get(1)?,
        total_chunks: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let blob: Option<Vec<u8>> = row.get(4)?;
    Ok(Chunk {
        id: parse_uuid(row.get::<_, String>(0)?)?,
        document_id: parse_uuid(row.get::<_, String>(1)?)?,
        chunk_index: row.get(2)?,
        content: row.get(3)?,
        embedding: blob.map(|b| blob_to_embedding(&b)),
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let role = Role::parse(&role_str).unwrap_or(Role::User);
    let sources_json: Option<String> = row.get(4)?;
    let sources: Option<Vec<SourceRef>> =
        sources_json.and_then(|json| serde_json::from_str(&json).ok());
    let created_at: DateTime<Utc> = row.get(5)?;

    Ok(Message {
        id: parse_uuid(row.get::<_, String>(0)?)?,
        conversation_id: parse_uuid(row.get::<_, String>(1)?)?,
        role,
        content: row.get(3)?,
        sources,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_document() -> (SqliteStore, Document) {
        let store = SqliteStore::in_memory().unwrap();
        let mut doc = Document::new("paper.pdf".to_string());
        doc.total_chunks = 3;
        store.insert_document(&doc).unwrap();
        (store, doc)
    }

    #[test]
    fn file_backed_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("docchat.db");

        let store = SqliteStore::new(&path).unwrap();
        let doc = Document::new("paper.pdf".to_string());
        store.insert_document(&doc).unwrap();

        assert!(path.exists());
        assert!(store.get_document(doc.id).unwrap().is_some());
    }

    #[test]
    fn embedding_blob_round_trips() {
        let original = vec![0.25f32, -1.5, 3.125];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&original)), original);
    }

    #[test]
    fn documents_round_trip() {
        let (store, doc) = store_with_document();
        let loaded = store.get_document(doc.id).unwrap().unwrap();
        assert_eq!(loaded.filename, "paper.pdf");
        assert_eq!(loaded.total_chunks, 3);
    }

    #[test]
    fn chunks_without_embedding_are_invisible_to_search() {
        let (store, doc) = store_with_document();
        store
            .insert_chunks(&[
                Chunk::new(doc.id, 0, "embedded".into(), Some(vec![1.0, 0.0])),
                Chunk::new(doc.id, 1, "not embedded".into(), None),
            ])
            .unwrap();

        let results =
            tokio_test::block_on(store.search(&[1.0, 0.0], doc.id, 10)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "embedded");
    }

    #[test]
    fn search_orders_by_similarity_then_index() {
        let (store, doc) = store_with_document();
        store
            .insert_chunks(&[
                Chunk::new(doc.id, 0, "far".into(), Some(vec![0.0, 1.0])),
                Chunk::new(doc.id, 1, "close".into(), Some(vec![1.0, 0.1])),
                Chunk::new(doc.id, 2, "exact".into(), Some(vec![1.0, 0.0])),
            ])
            .unwrap();

        let results =
            tokio_test::block_on(store.search(&[1.0, 0.0], doc.id, 10)).unwrap();
        assert_eq!(results[0].content, "exact");
        assert_eq!(results[1].content, "close");
        assert_eq!(results[2].content, "far");
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn search_returns_all_when_fewer_than_k() {
        let (store, doc) = store_with_document();
        store
            .insert_chunks(&[Chunk::new(doc.id, 0, "only".into(), Some(vec![1.0]))])
            .unwrap();

        let results = tokio_test::block_on(store.search(&[1.0], doc.id, 5)).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn search_is_scoped_to_document() {
        let (store, doc) = store_with_document();
        let other = Document::new("other.pdf".to_string());
        store.insert_document(&other).unwrap();
        store
            .insert_chunks(&[
                Chunk::new(doc.id, 0, "mine".into(), Some(vec![1.0])),
                Chunk::new(other.id, 0, "theirs".into(), Some(vec![1.0])),
            ])
            .unwrap();

        let results = tokio_test::block_on(store.search(&[1.0], doc.id, 10)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "mine");
    }

    #[test]
    fn backfill_fills_only_missing_embeddings() {
        let (store, doc) = store_with_document();
        let missing = Chunk::new(doc.id, 0, "missing".into(), None);
        let present = Chunk::new(doc.id, 1, "present".into(), Some(vec![0.5]));
        store.insert_chunks(&[missing.clone(), present.clone()]).unwrap();

        assert!(store.backfill_embedding(missing.id, &[1.0]).unwrap());
        assert!(!store.backfill_embedding(present.id, &[9.0]).unwrap());
        assert!(store.chunks_missing_embedding(10).unwrap().is_empty());
    }

    #[test]
    fn delete_document_cascades() {
        let (store, doc) = store_with_document();
        store
            .insert_chunks(&[Chunk::new(doc.id, 0, "c".into(), Some(vec![1.0]))])
            .unwrap();
        let conversation = Conversation::new(doc.id);
        store.insert_conversation(&conversation).unwrap();
        store
            .insert_message(&Message::user(conversation.id, "hi".into()))
            .unwrap();

        assert!(store.delete_document(doc.id).unwrap());
        assert!(store.get_document(doc.id).unwrap().is_none());
        assert!(store.get_conversation(conversation.id).unwrap().is_none());
        assert_eq!(store.chunk_count(doc.id).unwrap(), 0);
    }

    #[test]
    fn messages_round_trip_with_sources() {
        let (store, doc) = store_with_document();
        let conversation = Conversation::new(doc.id);
        store.insert_conversation(&conversation).unwrap();

        let sources = vec![SourceRef {
            chunk_id: Uuid::new_v4(),
            chunk_index: 2,
            preview: "preview".into(),
        }];
        store
            .insert_message(&Message::user(conversation.id, "question".into()))
            .unwrap();
        store
            .insert_message(&Message::assistant(
                conversation.id,
                "answer [1]".into(),
                sources.clone(),
            ))
            .unwrap();

        let messages = store.list_messages(conversation.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].sources.as_deref(), Some(sources.as_slice()));
    }
}
