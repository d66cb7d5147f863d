use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::domain::DocumentRef;

const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

/// File selected by the applicant but not yet stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "data")]
    pub bytes: Vec<u8>,
}

impl PendingDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    /// Declared content type, falling back to a guess from the file name.
    pub fn resolved_content_type(&self) -> String {
        match self.content_type.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() => declared.to_string(),
            _ => mime_guess::from_path(&self.name)
                .first_or(mime::APPLICATION_OCTET_STREAM)
                .to_string(),
        }
    }

    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// One step in the lifecycle of a single file upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UploadEvent {
    Started { total_bytes: u64 },
    Progress { percentage: u8 },
    Completed { document: DocumentRef },
    Failed { message: String },
}

impl UploadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadEvent::Completed { .. } | UploadEvent::Failed { .. })
    }
}

/// Producer half of a per-file progress sequence.
///
/// Percentages only move forward; the sequence closes when `complete` or `fail` consumes the sink.
#[derive(Debug)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<UploadEvent>,
    last_percentage: Option<u8>,
}

impl ProgressSink {
    pub fn started(&mut self, total_bytes: u64) {
        self.emit(UploadEvent::Started { total_bytes });
    }

    pub fn report(&mut self, percentage: u8) {
        let percentage = percentage.min(100);
        if self
            .last_percentage
            .is_some_and(|last| percentage <= last)
        {
            return;
        }
        self.last_percentage = Some(percentage);
        self.emit(UploadEvent::Progress { percentage });
    }

    pub fn complete(self, document: DocumentRef) {
        self.emit(UploadEvent::Completed { document });
    }

    pub fn fail(self, message: impl Into<String>) {
        self.emit(UploadEvent::Failed {
            message: message.into(),
        });
    }

    fn emit(&self, event: UploadEvent) {
        // Nobody subscribed; progress is advisory.
        let _ = self.tx.send(event);
    }
}

/// Consumer half: a finite sequence ending in `Completed` or `Failed`.
#[derive(Debug)]
pub struct ProgressEvents {
    rx: mpsc::UnboundedReceiver<UploadEvent>,
    finished: bool,
}

impl ProgressEvents {
    pub async fn next(&mut self) -> Option<UploadEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await;
        match &event {
            Some(event) if !event.is_terminal() => {}
            _ => self.finished = true,
        }
        event
    }

    pub async fn collect(mut self) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

pub fn progress_channel() -> (ProgressSink, ProgressEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSink {
            tx,
            last_percentage: None,
        },
        ProgressEvents {
            rx,
            finished: false,
        },
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub document: DocumentRef,
    pub bytes: Vec<u8>,
}

/// External blob storage. Implementations report progress through the sink while writing.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        document: PendingDocument,
        progress: &mut ProgressSink,
    ) -> Result<DocumentRef, BlobError>;

    async fn fetch(&self, key: &str) -> Result<Option<StoredBlob>, BlobError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobError {
    #[error("blob rejected: {0}")]
    Rejected(String),
    #[error("blob storage unavailable: {0}")]
    Unavailable(String),
}

/// Content-addressed store kept in process memory.
#[derive(Debug, Clone)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, StoredBlob>>>,
    chunk_bytes: usize,
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_BYTES)
    }
}

impl InMemoryBlobStore {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            blobs: Arc::default(),
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        document: PendingDocument,
        progress: &mut ProgressSink,
    ) -> Result<DocumentRef, BlobError> {
        let total = document.bytes.len();
        let mut hasher = Sha256::new();
        let mut written = 0usize;

        for chunk in document.bytes.chunks(self.chunk_bytes) {
            hasher.update(chunk);
            written += chunk.len();
            progress.report(((written * 100) / total) as u8);
            tokio::task::yield_now().await;
        }
        if total == 0 {
            progress.report(100);
        }

        let key = format!("blob-{:x}", hasher.finalize());
        let stored = DocumentRef {
            key: key.clone(),
            content_type: document.resolved_content_type(),
            name: document.name,
            size_bytes: total as u64,
        };

        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                StoredBlob {
                    document: stored.clone(),
                    bytes: document.bytes,
                },
            );

        Ok(stored)
    }

    async fn fetch(&self, key: &str) -> Result<Option<StoredBlob>, BlobError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}

/// A single file upload running on its own task.
#[derive(Debug)]
pub struct UploadTask {
    pub index: usize,
    pub name: String,
    events: Option<ProgressEvents>,
    handle: JoinHandle<Result<DocumentRef, BlobError>>,
}

impl UploadTask {
    /// Takes the progress sequence; only the first subscriber receives it.
    pub fn subscribe(&mut self) -> Option<ProgressEvents> {
        self.events.take()
    }

    pub async fn join(self) -> Result<DocumentRef, BlobError> {
        self.handle
            .await
            .map_err(|err| BlobError::Unavailable(format!("upload task aborted: {err}")))?
    }
}

pub fn spawn_upload<S>(store: Arc<S>, index: usize, document: PendingDocument) -> UploadTask
where
    S: BlobStore + 'static,
{
    let (mut sink, events) = progress_channel();
    let name = document.name.clone();

    let handle = tokio::spawn(async move {
        sink.started(document.bytes.len() as u64);
        let result = store.put(document, &mut sink).await;
        match &result {
            Ok(stored) => sink.complete(stored.clone()),
            Err(err) => sink.fail(err.to_string()),
        }
        result
    });

    UploadTask {
        index,
        name,
        events: Some(events),
        handle,
    }
}
