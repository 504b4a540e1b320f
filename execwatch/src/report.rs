//! # Event Reporting
//!
//! The read loop hands every outcome to an injected [`Reporter`] instead of
//! printing directly.
//!
//! ## Reporters
//!
//! - [`LogReporter`]: one `info!` line per exec
//! - [`JsonReporter`]: one JSON object per line on any `Write`
//! - [`ChannelReporter`]: forwards [`Report`] values to another thread

use crossbeam_channel::Sender;
use log::{info, warn};
use serde::Serialize;
use std::io::Write;

use crate::capture::RawEventRecord;
use crate::decode::ProcessExecEvent;
use crate::domain::{CpuId, DecodeError};

/// Sink for everything the read loop produces
pub trait Reporter {
    /// A record decoded successfully
    fn event(&mut self, event: &ProcessExecEvent);

    /// A record was dropped because it did not decode
    fn decode_failed(&mut self, _error: &DecodeError, _record: &RawEventRecord) {}

    /// The kernel dropped `lost` samples on `cpu`
    fn samples_lost(&mut self, _cpu: Option<CpuId>, _lost: u64) {}
}

/// Logs each exec through the `log` facade
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn event(&mut self, event: &ProcessExecEvent) {
        info!("pid={} comm={} filename={}", event.pid.0, event.comm, event.filename.display());
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    pid: u32,
    comm: &'a str,
    filename: std::borrow::Cow<'a, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu: Option<u32>,
}

/// Writes JSON lines: `{"pid":..,"comm":..,"filename":..}`
pub struct JsonReporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_event(&mut self, event: &ProcessExecEvent) -> std::io::Result<()> {
        let line = JsonEvent {
            pid: event.pid.0,
            comm: &event.comm,
            filename: event.filename.to_string_lossy(),
            cpu: event.cpu.map(|cpu| cpu.0),
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn event(&mut self, event: &ProcessExecEvent) {
        if let Err(e) = self.write_event(event) {
            warn!("Failed to write event: {e}");
        }
    }
}

/// Everything a [`ChannelReporter`] forwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Event(ProcessExecEvent),
    DecodeFailed(DecodeError),
    SamplesLost { cpu: Option<CpuId>, lost: u64 },
}

/// Forwards reports over a channel, dropping them if the receiver falls behind
#[derive(Debug)]
pub struct ChannelReporter {
    tx: Sender<Report>,
}

impl ChannelReporter {
    #[must_use]
    pub fn new(tx: Sender<Report>) -> Self {
        Self { tx }
    }
}

impl Reporter for ChannelReporter {
    fn event(&mut self, event: &ProcessExecEvent) {
        let _ = self.tx.try_send(Report::Event(event.clone()));
    }

    fn decode_failed(&mut self, error: &DecodeError, _record: &RawEventRecord) {
        let _ = self.tx.try_send(Report::DecodeFailed(error.clone()));
    }

    fn samples_lost(&mut self, cpu: Option<CpuId>, lost: u64) {
        let _ = self.tx.try_send(Report::SamplesLost { cpu, lost });
    }
}

/// Counters kept by the read loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub events: u64,
    pub decode_failures: u64,
    pub lost_samples: u64,
}

/// Display capture statistics
pub fn display_statistics(stats: &CaptureStats) {
    eprintln!(
        "stats: events={} decode_failures={} lost_samples={}",
        stats.events, stats.decode_failures, stats.lost_samples
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pid;
    use std::path::PathBuf;

    fn sample_event(cpu: Option<CpuId>) -> ProcessExecEvent {
        ProcessExecEvent {
            pid: Pid(4242),
            comm: "bash".to_string(),
            filename: PathBuf::from("/bin/ls"),
            cpu,
        }
    }

    #[test]
    fn test_json_reporter_writes_one_line_per_event() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.event(&sample_event(None));
        reporter.event(&sample_event(Some(CpuId(2))));

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["pid"], 4242);
        assert_eq!(first["comm"], "bash");
        assert_eq!(first["filename"], "/bin/ls");
        assert!(first.get("cpu").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["cpu"], 2);
    }

    #[test]
    fn test_channel_reporter_forwards_everything() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut reporter = ChannelReporter::new(tx);

        reporter.event(&sample_event(None));
        reporter.samples_lost(Some(CpuId(1)), 5);
        reporter.decode_failed(
            &DecodeError::Truncated { expected: 536, actual: 4 },
            &RawEventRecord::new(vec![0u8; 4]),
        );

        assert_eq!(rx.recv().unwrap(), Report::Event(sample_event(None)));
        assert_eq!(rx.recv().unwrap(), Report::SamplesLost { cpu: Some(CpuId(1)), lost: 5 });
        assert!(matches!(rx.recv().unwrap(), Report::DecodeFailed(DecodeError::Truncated { .. })));
    }
}
