//! Concrete telemetry sinks

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EventRecord, MetricRecord, TelemetryRecord, TelemetrySink};

/// Keeps every record in memory
///
/// Clones share the same buffer, so a handle can be kept for inspection
/// while another is moved into the engine.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl RecordingSink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().clone()
    }

    /// Recorded events only
    pub fn events(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .iter()
            .filter_map(|record| match record {
                TelemetryRecord::Event(event) => Some(event.clone()),
                TelemetryRecord::Metric(_) => None,
            })
            .collect()
    }

    /// Recorded metrics only
    pub fn metrics(&self) -> Vec<MetricRecord> {
        self.records
            .lock()
            .iter()
            .filter_map(|record| match record {
                TelemetryRecord::Metric(metric) => Some(metric.clone()),
                TelemetryRecord::Event(_) => None,
            })
            .collect()
    }

    /// Events with the given name
    pub fn events_named(&self, name: &str) -> Vec<EventRecord> {
        self.events().into_iter().filter(|event| event.name == name).collect()
    }

    /// Forget everything recorded
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl TelemetrySink for RecordingSink {
    fn track_event(&self, event: EventRecord) {
        self.records.lock().push(TelemetryRecord::Event(event));
    }

    fn track_metric(&self, metric: MetricRecord) {
        self.records.lock().push(TelemetryRecord::Metric(metric));
    }
}

/// Logs every record through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn track_event(&self, event: EventRecord) {
        let properties = serde_json::to_string(&event.properties).unwrap_or_default();
        info!(target: "slot_telemetry::event", name = %event.name, %properties, "event");
    }

    fn track_metric(&self, metric: MetricRecord) {
        info!(target: "slot_telemetry::metric", name = %metric.name, value = metric.value, "metric");
    }
}

/// Writes one human-readable line per record
///
/// Same content as [`TracingSink`], for when the log should land in a file
/// instead of the diagnostic stream.
///
/// The writer is flushed when the sink is dropped.
pub struct LogLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LogLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_line(&self, line: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.writer.lock(), "{}", line) {
            warn!("Failed to write telemetry log line: {}", e);
        }
    }
}

impl<W: Write + Send> TelemetrySink for LogLinesSink<W> {
    fn track_event(&self, event: EventRecord) {
        let properties = serde_json::to_string(&event.properties).unwrap_or_default();
        self.write_line(format_args!(
            "{} event {} properties={}",
            event.timestamp_ms, event.name, properties
        ));
    }

    fn track_metric(&self, metric: MetricRecord) {
        self.write_line(format_args!("metric {} value={}", metric.name, metric.value));
    }
}

impl<W: Write + Send> Drop for LogLinesSink<W> {
    fn drop(&mut self) {
        if let Err(e) = self.writer.get_mut().flush() {
            warn!("Failed to flush telemetry log: {}", e);
        }
    }
}

/// Forwards records to another thread over a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<TelemetryRecord>,
}

impl ChannelSink {
    /// Wrap an existing sender
    pub fn new(sender: Sender<TelemetryRecord>) -> Self {
        Self { sender }
    }

    /// Create a sink and the receiving end of its channel
    pub fn unbounded() -> (Self, Receiver<TelemetryRecord>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, record: TelemetryRecord) {
        if let Err(e) = self.sender.send(record) {
            warn!("Dropping telemetry record {:?}: receiver disconnected", e.0.name());
        }
    }
}

impl TelemetrySink for ChannelSink {
    fn track_event(&self, event: EventRecord) {
        self.send(TelemetryRecord::Event(event));
    }

    fn track_metric(&self, metric: MetricRecord) {
        self.send(TelemetryRecord::Metric(metric));
    }
}

#[derive(Serialize)]
struct Line<'a> {
    session_id: &'a str,
    #[serde(flatten)]
    record: &'a TelemetryRecord,
}

/// Writes records as JSON, one object per line, tagged with a session id
pub struct JsonLinesWriter<W: Write> {
    writer: W,
    session_id: String,
}

impl<W: Write> JsonLinesWriter<W> {
    /// Create a writer for the given session
    pub fn new(writer: W, session_id: Uuid) -> Self {
        Self {
            writer,
            session_id: session_id.to_string(),
        }
    }

    /// Write a single record
    pub fn write_record(&mut self, record: &TelemetryRecord) -> anyhow::Result<()> {
        let line = Line {
            session_id: &self.session_id,
            record,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Drain the channel until every sender is gone; returns records written
    pub fn run(mut self, receiver: Receiver<TelemetryRecord>) -> usize {
        let mut written = 0;
        for record in receiver.iter() {
            match self.write_record(&record) {
                Ok(()) => written += 1,
                Err(e) => warn!("Failed to write telemetry record {:?}: {}", record.name(), e),
            }
        }
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush telemetry output: {}", e);
        }
        debug!("JSON writer finished after {} records", written);
        written
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Run a [`JsonLinesWriter`] on its own thread
pub fn spawn_json_writer<W>(writer: W, receiver: Receiver<TelemetryRecord>, session_id: Uuid) -> JoinHandle<usize>
where
    W: Write + Send + 'static,
{
    std::thread::spawn(move || {
        debug!("JSON writer thread starting for session {}", session_id);
        JsonLinesWriter::new(writer, session_id).run(receiver)
    })
}
