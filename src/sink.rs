//! Output sinks for extracted records

use std::{path::Path, sync::Arc};

use serde::Serialize;
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
    sync::Mutex,
};

use crate::extract::Record;
use crate::frontier::HandlerId;
use crate::key::{Attribute, EntityKey};

/// A record together with the task it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlItem {
    pub handler: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<Attribute>,
    #[serde(flatten)]
    pub record: Record,
}

impl CrawlItem {
    pub fn new(handler: &HandlerId, key: &EntityKey, record: Record) -> Self {
        Self {
            handler: handler.to_string(),
            name: key.name().to_string(),
            attribute: key.attribute(),
            record,
        }
    }
}

/// Destination for extracted records
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, item: CrawlItem) -> std::io::Result<()>;

    /// Flush buffered output; called once when the crawl ends
    async fn flush(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink {
    out: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Create (or truncate) `path`
    pub async fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }
}

#[async_trait::async_trait]
impl RecordSink for JsonLinesSink {
    async fn write(&self, item: CrawlItem) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(&item)?;
        line.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&line).await
    }

    async fn flush(&self) -> std::io::Result<()> {
        self.out.lock().await.flush().await
    }
}

/// Collects records in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    items: Arc<Mutex<Vec<CrawlItem>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub async fn items(&self) -> Vec<CrawlItem> {
        self.items.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl RecordSink for MemorySink {
    async fn write(&self, item: CrawlItem) -> std::io::Result<()> {
        self.items.lock().await.push(item);
        Ok(())
    }
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait::async_trait]
impl RecordSink for NullSink {
    async fn write(&self, _item: CrawlItem) -> std::io::Result<()> {
        Ok(())
    }
}
