use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::sync::{Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::collaborators::stores::{RequestProgress, RequestTracker};
use crate::error::Result;

/// Columns of the progress file, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProgressColumn {
    /// Milliseconds since the log was opened.
    Time,
    RequestId,
    TrackerLink,
    /// Number of resource nodes of the request.
    ComponentCount,
    ComponentName,
    ResourceType,
    /// Execution level of the component in the dependency graph.
    Level,
}

impl ProgressColumn {
    pub const ALL: [ProgressColumn; 7] = [
        ProgressColumn::Time,
        ProgressColumn::RequestId,
        ProgressColumn::TrackerLink,
        ProgressColumn::ComponentCount,
        ProgressColumn::ComponentName,
        ProgressColumn::ResourceType,
        ProgressColumn::Level,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            ProgressColumn::Time => "Time",
            ProgressColumn::RequestId => "RequestId",
            ProgressColumn::TrackerLink => "TrackerLink",
            ProgressColumn::ComponentCount => "ComponentCount",
            ProgressColumn::ComponentName => "ComponentName",
            ProgressColumn::ResourceType => "ResourceType",
            ProgressColumn::Level => "Level",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressValue {
    Integer(i64),
    Text(String),
}

impl From<i64> for ProgressValue {
    fn from(v: i64) -> Self {
        ProgressValue::Integer(v)
    }
}

impl From<u32> for ProgressValue {
    fn from(v: u32) -> Self {
        ProgressValue::Integer(v as i64)
    }
}

impl From<usize> for ProgressValue {
    fn from(v: usize) -> Self {
        ProgressValue::Integer(v as i64)
    }
}

impl From<String> for ProgressValue {
    fn from(v: String) -> Self {
        ProgressValue::Text(v)
    }
}

impl From<&str> for ProgressValue {
    fn from(v: &str) -> Self {
        ProgressValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressEvent {
    data: HashMap<ProgressColumn, ProgressValue>,
}

impl ProgressEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<V: Into<ProgressValue>>(&mut self, column: ProgressColumn, value: V) -> &mut Self {
        self.data.insert(column, value.into());
        self
    }

    pub fn get(&self, column: ProgressColumn) -> Option<&ProgressValue> {
        self.data.get(&column)
    }

    fn to_row(&self) -> Vec<String> {
        ProgressColumn::ALL
            .iter()
            .map(|column| match self.data.get(column) {
                Some(ProgressValue::Integer(i)) => i.to_string(),
                Some(ProgressValue::Text(t)) => t.clone(),
                None => "NA".to_string(),
            })
            .collect()
    }
}

enum ProgressMessage {
    Record(ProgressEvent),
    Flush,
    Shutdown,
}

/// Request-progress writer. Rows are written as `;`-separated CSV by a background thread.
pub struct ProgressLog {
    sender: mpsc::Sender<ProgressMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
    opened_at: Instant,
}

impl ProgressLog {
    /// Writes to `filename`, or to stdout when no file is given or it can't be created.
    pub fn init(filename: Option<String>) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || Self::worker_loop(rx, filename));
        Self { sender: tx, worker: Mutex::new(Some(worker)), opened_at: Instant::now() }
    }

    fn worker_loop(rx: mpsc::Receiver<ProgressMessage>, filename: Option<String>) {
        let writer: Box<dyn Write> = match filename {
            Some(f) => match File::create(&f) {
                Ok(file) => Box::new(file),
                Err(e) => {
                    log::error!("Could not create progress file '{}': {}. Writing to stdout.", f, e);
                    Box::new(io::stdout())
                }
            },
            None => Box::new(io::stdout()),
        };
        let mut csv_wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);

        let headers: Vec<&str> = ProgressColumn::ALL.iter().map(|c| c.header()).collect();
        if let Err(e) = csv_wtr.write_record(&headers) {
            log::error!("Progress log: failed to write headers: {}", e);
        }

        for msg in rx {
            match msg {
                ProgressMessage::Record(event) => {
                    if let Err(e) = csv_wtr.write_record(event.to_row()) {
                        log::error!("Progress log: failed to write record: {}", e);
                    }
                }
                ProgressMessage::Flush => {
                    let _ = csv_wtr.flush();
                }
                ProgressMessage::Shutdown => break,
            }
        }
        let _ = csv_wtr.flush();
    }

    /// Non-blocking. Stamps the event with the elapsed time if it carries none.
    pub fn add_event(&self, mut event: ProgressEvent) {
        if event.get(ProgressColumn::Time).is_none() {
            event.set(ProgressColumn::Time, self.opened_at.elapsed().as_millis() as i64);
        }
        if self.sender.send(ProgressMessage::Record(event)).is_err() {
            log::warn!("Progress log is closed, event dropped.");
        }
    }

    pub fn flush(&self) {
        let _ = self.sender.send(ProgressMessage::Flush);
    }

    /// Flushes pending rows and waits for the writer thread.
    pub fn close(&self) {
        let _ = self.sender.send(ProgressMessage::Shutdown);
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("Progress log writer thread panicked.");
            }
        }
    }
}

#[async_trait]
impl RequestTracker for ProgressLog {
    async fn update_components(&self, progress: RequestProgress) -> Result<()> {
        let count = progress.components.len();
        for component in &progress.components {
            let mut event = ProgressEvent::new();
            event
                .set(ProgressColumn::RequestId, progress.request_id.as_str())
                .set(ProgressColumn::TrackerLink, progress.tracker_link.as_str())
                .set(ProgressColumn::ComponentCount, count)
                .set(ProgressColumn::ComponentName, component.name.as_str())
                .set(ProgressColumn::ResourceType, component.resource_type.as_str())
                .set(ProgressColumn::Level, component.level);
            self.add_event(event);
        }
        self.flush();
        Ok(())
    }
}
