//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DocumentStore` port, used when no
//! database is configured and throughout the test suite.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use study_assistant_core::domain::{Document, SourceDocument, TaskUpdate};
use study_assistant_core::ports::{DocumentStore, PortError, PortResult};
use study_assistant_core::status::{TaskKind, TaskStatus};
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

/// A document together with its raw bytes.
struct StoredDocument {
    document: Document,
    source: Bytes,
    /// Set under the entry lock when the document is deleted, so writers that
    /// already hold the entry see the removal.
    removed: bool,
}

/// Keeps every document behind its own mutex.
///
/// The outer map lock is only held long enough to look up, insert or remove an
/// entry; all task updates take the per-document lock, so updates to one
/// document are serialized while different documents never wait on each other.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<Uuid, Arc<Mutex<StoredDocument>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, document_id: Uuid) -> PortResult<Arc<Mutex<StoredDocument>>> {
        self.documents
            .read()
            .await
            .get(&document_id)
            .cloned()
            .ok_or_else(|| not_found(document_id))
    }
}

fn not_found(document_id: Uuid) -> PortError {
    PortError::NotFound(format!("Document {} not found", document_id))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_document(&self, owner_id: Uuid, name: &str, content: Bytes) -> PortResult<Document> {
        let document = Document::new(owner_id, name, content.len() as u64, Utc::now());
        let stored = StoredDocument {
            document: document.clone(),
            source: content,
            removed: false,
        };
        self.documents
            .write()
            .await
            .insert(document.id, Arc::new(Mutex::new(stored)));
        info!("Stored document {} ({}) for user {}", document.id, document.name, owner_id);
        Ok(document)
    }

    async fn get_document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<Document> {
        let entry = self.entry(document_id).await?;
        let stored = entry.lock().await;
        if stored.removed || stored.document.owner_id != owner_id {
            return Err(not_found(document_id));
        }
        Ok(stored.document.clone())
    }

    async fn list_documents(&self, owner_id: Uuid) -> PortResult<Vec<Document>> {
        let entries: Vec<_> = self.documents.read().await.values().cloned().collect();

        let mut documents = Vec::new();
        for entry in entries {
            let stored = entry.lock().await;
            if !stored.removed && stored.document.owner_id == owner_id {
                documents.push(stored.document.clone());
            }
        }
        documents.sort_by(|a, b| {
            b.upload_date
                .cmp(&a.upload_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(documents)
    }

    async fn get_source(&self, document_id: Uuid) -> PortResult<SourceDocument> {
        let entry = self.entry(document_id).await?;
        let stored = entry.lock().await;
        if stored.removed {
            return Err(not_found(document_id));
        }
        Ok(SourceDocument {
            document_id,
            name: stored.document.name.clone(),
            file_type: stored.document.file_type.clone(),
            bytes: stored.source.clone(),
        })
    }

    async fn update_task(
        &self,
        document_id: Uuid,
        kind: TaskKind,
        update: TaskUpdate,
    ) -> PortResult<Document> {
        let entry = self.entry(document_id).await?;
        let mut stored = entry.lock().await;
        if stored.removed {
            return Err(not_found(document_id));
        }

        let target = update.target_status();
        if stored.document.apply(kind, update, Utc::now())? {
            info!(
                "Document {} {} task is now {} (overall {})",
                document_id,
                kind,
                target,
                stored.document.status()
            );
        }
        Ok(stored.document.clone())
    }

    async fn delete_document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<()> {
        let mut documents = self.documents.write().await;
        let entry = documents
            .get(&document_id)
            .cloned()
            .ok_or_else(|| not_found(document_id))?;

        let mut stored = entry.lock().await;
        if stored.removed || stored.document.owner_id != owner_id {
            return Err(not_found(document_id));
        }
        stored.removed = true;
        documents.remove(&document_id);
        info!("Deleted document {}", document_id);
        Ok(())
    }

    async fn tasks_with_status(&self, status: TaskStatus) -> PortResult<Vec<(Uuid, TaskKind)>> {
        let entries: Vec<_> = self.documents.read().await.values().cloned().collect();

        let mut matching = Vec::new();
        for entry in entries {
            let stored = entry.lock().await;
            if stored.removed {
                continue;
            }
            for task in stored.document.tasks().iter() {
                if task.status() == status {
                    matching.push((stored.document.id, task.kind()));
                }
            }
        }
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use study_assistant_core::domain::GeneratedContent;
    use study_assistant_core::status::DocumentStatus;

    fn text(value: &str) -> GeneratedContent {
        GeneratedContent::Text(value.to_string())
    }

    async fn store_with_document() -> (InMemoryDocumentStore, Document) {
        let store = InMemoryDocumentStore::new();
        let doc = store
            .create_document(Uuid::new_v4(), "chapter1.txt", Bytes::from_static(b"Cells divide."))
            .await
            .unwrap();
        (store, doc)
    }

    #[tokio::test]
    async fn create_starts_uploaded_with_pending_tasks() {
        let (store, doc) = store_with_document().await;

        assert_eq!(doc.status(), DocumentStatus::Uploaded);
        assert_eq!(doc.size, 13);
        assert_eq!(doc.file_type, "text/plain");

        let fetched = store.get_document(doc.id, doc.owner_id).await.unwrap();
        assert_eq!(fetched, doc);
        for task in fetched.tasks().iter() {
            assert_eq!(task.status(), TaskStatus::Pending);
        }

        let source = store.get_source(doc.id).await.unwrap();
        assert_eq!(&source.bytes[..], b"Cells divide.");
    }

    #[tokio::test]
    async fn get_hides_documents_of_other_users() {
        let (store, doc) = store_with_document().await;

        let err = store.get_document(doc.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));

        let err = store.get_document(Uuid::new_v4(), doc.owner_id).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner_and_newest_first() {
        let store = InMemoryDocumentStore::new();
        let owner = Uuid::new_v4();

        let first = store.create_document(owner, "a.txt", Bytes::from_static(b"a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create_document(owner, "b.txt", Bytes::from_static(b"b")).await.unwrap();
        store
            .create_document(Uuid::new_v4(), "c.txt", Bytes::from_static(b"c"))
            .await
            .unwrap();

        let ids: Vec<Uuid> = store
            .list_documents(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn list_breaks_upload_date_ties_by_id() {
        let store = InMemoryDocumentStore::new();
        let owner = Uuid::new_v4();
        let uploaded_at = Utc::now();

        let mut ids = Vec::new();
        for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
            let document = Document::new(owner, name, 1, uploaded_at);
            ids.push(document.id);
            let stored = StoredDocument {
                document: document.clone(),
                source: Bytes::from_static(b"x"),
                removed: false,
            };
            store
                .documents
                .write()
                .await
                .insert(document.id, Arc::new(Mutex::new(stored)));
        }
        ids.sort_by(|a, b| b.cmp(a));

        for _ in 0..3 {
            let listed: Vec<Uuid> = store
                .list_documents(owner)
                .await
                .unwrap()
                .into_iter()
                .map(|d| d.id)
                .collect();
            assert_eq!(listed, ids);
        }
    }

    #[tokio::test]
    async fn update_task_recomputes_overall_status() {
        let (store, doc) = store_with_document().await;

        let updated = store.update_task(doc.id, TaskKind::Quiz, TaskUpdate::Start).await.unwrap();
        assert_eq!(updated.status(), DocumentStatus::Processing);
        assert!(updated.updated_at >= doc.updated_at);

        let updated = store
            .update_task(doc.id, TaskKind::Quiz, TaskUpdate::Fail("remote 502".into()))
            .await
            .unwrap();
        assert_eq!(updated.task(TaskKind::Quiz).error(), Some("remote 502"));
        assert_eq!(updated.status(), DocumentStatus::Processing);
    }

    #[tokio::test]
    async fn repeated_terminal_update_leaves_state_unchanged() {
        let (store, doc) = store_with_document().await;
        store.update_task(doc.id, TaskKind::Summary, TaskUpdate::Start).await.unwrap();
        let first = store
            .update_task(doc.id, TaskKind::Summary, TaskUpdate::Complete(text("gist")))
            .await
            .unwrap();

        let second = store
            .update_task(doc.id, TaskKind::Summary, TaskUpdate::Complete(text("gist")))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn refused_transition_is_a_conflict() {
        let (store, doc) = store_with_document().await;

        let err = store
            .update_task(doc.id, TaskKind::Flashcards, TaskUpdate::Reset)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        let unchanged = store.get_document(doc.id, doc.owner_id).await.unwrap();
        assert_eq!(unchanged, doc);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_to_one_document_are_not_lost() {
        let (store, doc) = store_with_document().await;
        let store = Arc::new(store);
        let document_id = doc.id;

        let mut handles = Vec::new();
        for kind in [TaskKind::Summary, TaskKind::Quiz] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update_task(document_id, kind, TaskUpdate::Start).await.unwrap();
                store
                    .update_task(document_id, kind, TaskUpdate::Complete(text(kind.as_str())))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let doc = store.get_document(doc.id, doc.owner_id).await.unwrap();
        assert_eq!(doc.task(TaskKind::Summary).content(), Some(&text("summary")));
        assert_eq!(doc.task(TaskKind::Quiz).content(), Some(&text("quiz")));
        assert_eq!(doc.task(TaskKind::Flashcards).status(), TaskStatus::Pending);
        assert_eq!(doc.status(), DocumentStatus::Processing);
    }

    #[tokio::test]
    async fn tasks_with_status_scans_every_owner() {
        let (store, first) = store_with_document().await;
        let second = store
            .create_document(Uuid::new_v4(), "chapter2.txt", Bytes::from_static(b"Cells grow."))
            .await
            .unwrap();
        store.update_task(first.id, TaskKind::Quiz, TaskUpdate::Start).await.unwrap();
        store
            .update_task(second.id, TaskKind::Flashcards, TaskUpdate::Start)
            .await
            .unwrap();

        let processing: HashSet<_> = store
            .tasks_with_status(TaskStatus::Processing)
            .await
            .unwrap()
            .into_iter()
            .collect();
        let expected = HashSet::from([(first.id, TaskKind::Quiz), (second.id, TaskKind::Flashcards)]);
        assert_eq!(processing, expected);

        store.delete_document(second.id, second.owner_id).await.unwrap();
        let pending = store.tasks_with_status(TaskStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|(id, _)| *id == first.id));
    }

    #[tokio::test]
    async fn delete_removes_document_for_owner_only() {
        let (store, doc) = store_with_document().await;

        let err = store.delete_document(doc.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));

        store.delete_document(doc.id, doc.owner_id).await.unwrap();
        assert!(store.get_document(doc.id, doc.owner_id).await.is_err());
        assert!(store.get_source(doc.id).await.is_err());
        assert!(matches!(
            store.update_task(doc.id, TaskKind::Quiz, TaskUpdate::Start).await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_document(doc.id, doc.owner_id).await,
            Err(PortError::NotFound(_))
        ));
    }
}
