//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DocumentStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Task updates run inside a transaction that locks the document row with
//! `SELECT ... FOR UPDATE`, which serializes writers of one document without
//! blocking writers of any other document.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use study_assistant_core::domain::{
    ContentTask, Document, GeneratedContent, SourceDocument, TaskSet, TaskUpdate,
};
use study_assistant_core::ports::{DocumentStore, PortError, PortResult};
use study_assistant_core::status::{TaskKind, TaskStatus};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(document_id: Uuid) -> PortError {
    PortError::NotFound(format!("Document {} not found", document_id))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    user_id: Uuid,
    original_name: String,
    file_size: i64,
    file_type: String,
    upload_date: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn to_domain(self, tasks: Vec<TaskRecord>) -> PortResult<Document> {
        let tasks = tasks
            .into_iter()
            .map(TaskRecord::to_domain)
            .collect::<PortResult<Vec<_>>>()?;
        let tasks = TaskSet::from_tasks(tasks)?;
        Ok(Document::restore(
            self.id,
            self.user_id,
            self.original_name,
            self.file_size.max(0) as u64,
            self.file_type,
            self.upload_date,
            self.updated_at,
            tasks,
        ))
    }
}

#[derive(FromRow)]
struct TaskRecord {
    document_id: Uuid,
    kind: String,
    status: String,
    content: Option<Json<GeneratedContent>>,
    error_message: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TaskRecord {
    fn to_domain(self) -> PortResult<ContentTask> {
        let kind = self
            .kind
            .parse::<TaskKind>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let status = self
            .status
            .parse::<TaskStatus>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let task = ContentTask::restore(
            kind,
            status,
            self.content.map(|json| json.0),
            self.error_message,
            self.updated_at,
        )?;
        Ok(task)
    }
}

#[derive(FromRow)]
struct SourceRecord {
    id: Uuid,
    original_name: String,
    file_type: String,
    file_content: Vec<u8>,
}

const DOCUMENT_COLUMNS: &str =
    "id, user_id, original_name, file_size, file_type, upload_date, updated_at";
const TASK_COLUMNS: &str = "document_id, kind, status, content, error_message, updated_at";

async fn fetch_tasks(conn: &mut PgConnection, document_id: Uuid) -> PortResult<Vec<TaskRecord>> {
    let query = format!("SELECT {} FROM content_tasks WHERE document_id = $1", TASK_COLUMNS);
    sqlx::query_as::<_, TaskRecord>(&query)
        .bind(document_id)
        .fetch_all(conn)
        .await
        .map_err(unexpected)
}

async fn write_task(conn: &mut PgConnection, document_id: Uuid, task: &ContentTask) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO content_tasks (document_id, kind, status, content, error_message, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (document_id, kind) DO UPDATE SET \
         status = EXCLUDED.status, content = EXCLUDED.content, \
         error_message = EXCLUDED.error_message, updated_at = EXCLUDED.updated_at",
    )
    .bind(document_id)
    .bind(task.kind().as_str())
    .bind(task.status().as_str())
    .bind(task.content().map(Json))
    .bind(task.error())
    .bind(task.updated_at())
    .execute(conn)
    .await
    .map_err(unexpected)?;
    Ok(())
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create_document(&self, owner_id: Uuid, name: &str, content: Bytes) -> PortResult<Document> {
        let document = Document::new(owner_id, name, content.len() as u64, Utc::now());

        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query(
            "INSERT INTO documents \
             (id, user_id, original_name, file_size, file_type, file_content, status, upload_date, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(document.id)
        .bind(owner_id)
        .bind(&document.name)
        .bind(document.size as i64)
        .bind(&document.file_type)
        .bind(&content[..])
        .bind(document.status().as_str())
        .bind(document.upload_date)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        for task in document.tasks().iter() {
            write_task(&mut tx, document.id, task).await?;
        }
        tx.commit().await.map_err(unexpected)?;

        info!("Stored document {} ({}) for user {}", document.id, document.name, owner_id);
        Ok(document)
    }

    async fn get_document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<Document> {
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;
        let query = format!(
            "SELECT {} FROM documents WHERE id = $1 AND user_id = $2",
            DOCUMENT_COLUMNS
        );
        let record = sqlx::query_as::<_, DocumentRecord>(&query)
            .bind(document_id)
            .bind(owner_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| not_found(document_id))?;

        let tasks = fetch_tasks(&mut conn, document_id).await?;
        record.to_domain(tasks)
    }

    async fn list_documents(&self, owner_id: Uuid) -> PortResult<Vec<Document>> {
        let query = format!(
            "SELECT {} FROM documents WHERE user_id = $1 ORDER BY upload_date DESC, id DESC",
            DOCUMENT_COLUMNS
        );
        let records = sqlx::query_as::<_, DocumentRecord>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let query = format!(
            "SELECT {} FROM content_tasks WHERE document_id = ANY($1)",
            TASK_COLUMNS
        );
        let task_records = sqlx::query_as::<_, TaskRecord>(&query)
            .bind(&ids[..])
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let mut tasks_by_document: HashMap<Uuid, Vec<TaskRecord>> = HashMap::new();
        for task in task_records {
            tasks_by_document.entry(task.document_id).or_default().push(task);
        }

        records
            .into_iter()
            .map(|record| {
                let tasks = tasks_by_document.remove(&record.id).unwrap_or_default();
                record.to_domain(tasks)
            })
            .collect()
    }

    async fn get_source(&self, document_id: Uuid) -> PortResult<SourceDocument> {
        let record = sqlx::query_as::<_, SourceRecord>(
            "SELECT id, original_name, file_type, file_content FROM documents WHERE id = $1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| not_found(document_id))?;

        Ok(SourceDocument {
            document_id: record.id,
            name: record.original_name,
            file_type: record.file_type,
            bytes: Bytes::from(record.file_content),
        })
    }

    async fn update_task(
        &self,
        document_id: Uuid,
        kind: TaskKind,
        update: TaskUpdate,
    ) -> PortResult<Document> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The row lock is held until commit or rollback.
        let query = format!("SELECT {} FROM documents WHERE id = $1 FOR UPDATE", DOCUMENT_COLUMNS);
        let record = sqlx::query_as::<_, DocumentRecord>(&query)
            .bind(document_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| not_found(document_id))?;
        let tasks = fetch_tasks(&mut tx, document_id).await?;
        let mut document = record.to_domain(tasks)?;

        let target = update.target_status();
        if document.apply(kind, update, Utc::now())? {
            write_task(&mut tx, document_id, document.task(kind)).await?;
            sqlx::query("UPDATE documents SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(document.status().as_str())
                .bind(document.updated_at)
                .bind(document_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
            info!(
                "Document {} {} task is now {} (overall {})",
                document_id,
                kind,
                target,
                document.status()
            );
        }
        tx.commit().await.map_err(unexpected)?;

        Ok(document)
    }

    async fn delete_document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND user_id = $2")
            .bind(document_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(not_found(document_id));
        }
        info!("Deleted document {}", document_id);
        Ok(())
    }

    async fn tasks_with_status(&self, status: TaskStatus) -> PortResult<Vec<(Uuid, TaskKind)>> {
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT document_id, kind FROM content_tasks WHERE status = $1")
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(unexpected)?;

        rows.into_iter()
            .map(|(document_id, kind)| {
                let kind = kind
                    .parse::<TaskKind>()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?;
                Ok((document_id, kind))
            })
            .collect()
    }
}
