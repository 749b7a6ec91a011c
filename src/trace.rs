//! Waveform trace recording.
//!
//! A [`TraceRecorder`] is attached to one model instance and receives one
//! snapshot of every signal line per clock edge. The VCD header is written
//! when the recorder attaches and every clock edge is encoded and flushed to
//! the destination as it happens, so an abnormal exit leaves a truncated but
//! readable waveform.
//!
//! # Lifetime
//!
//! Closing is guaranteed: [`TraceRecorder::close`] finalizes explicitly and
//! reports errors, and dropping an unclosed recorder finalizes as well
//! (errors are logged). A closed recorder stops receiving snapshots; the
//! model detaches from it on its next step.
//!
//! # Example
//!
//! ```
//! use kvsim::{ClockedModel, ContextConfig, ModelInstance, ModelVariant, SimContext};
//! use kvsim::trace::{TraceDestination, TraceRecorder};
//!
//! let ctx = SimContext::new(ContextConfig::new().with_trace(true));
//! let mut model = ModelInstance::create(&ctx, ModelVariant::HashMap);
//! let recorder = TraceRecorder::attach(&mut model, TraceDestination::Memory).unwrap();
//!
//! model.step();
//! model.step();
//! assert_eq!(recorder.snapshot_count(), 2);
//!
//! let vcd = recorder.render_vcd().unwrap();
//! assert!(vcd.contains("ins_key"));
//! recorder.close().unwrap();
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{SimError, SimResult};
use crate::model::ModelInstance;
use crate::signal::{SignalLine, SignalState};
use crate::types::SimTime;

/// Where the waveform goes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceDestination {
    /// Stream a VCD file at this path
    File(PathBuf),
    /// Keep the waveform and the snapshots in memory
    Memory,
}

/// One traced clock edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time: SimTime,
    /// Clock period in effect on this edge; `clk` falls at `time + period / 2`
    pub period: SimTime,
    pub state: SignalState,
}

/// Incremental VCD encoder for the fixed signal set.
#[derive(Debug)]
struct VcdEncoder {
    ids: Vec<vcd::IdCode>,
    previous: Option<SignalState>,
}

impl VcdEncoder {
    /// Writes the VCD header and returns an encoder for the value changes.
    fn begin<W: Write>(out: W, scope: &str) -> std::io::Result<Self> {
        let mut writer = vcd::Writer::new(out);
        writer.timescale(1, vcd::TimescaleUnit::NS)?;
        writer.add_module(scope)?;
        let mut ids = Vec::with_capacity(SignalLine::ALL.len());
        for line in SignalLine::ALL {
            ids.push(writer.add_wire(line.width(), line.name())?);
        }
        writer.upscope()?;
        writer.enddefinitions()?;
        Ok(Self {
            ids,
            previous: None,
        })
    }

    /// Writes one clock edge: `clk` high with every changed line at the
    /// snapshot's time, `clk` low half a period later.
    fn encode<W: Write>(&mut self, out: W, snapshot: &Snapshot) -> std::io::Result<()> {
        let mut writer = vcd::Writer::new(out);
        writer.timestamp(snapshot.time)?;
        for (line, id) in SignalLine::ALL.iter().zip(&self.ids) {
            let value = snapshot.state.get(*line);
            let changed = self.previous.map_or(true, |p| p.get(*line) != value);
            if changed || *line == SignalLine::Clk {
                if line.width() == 1 {
                    writer.change_scalar(*id, bit(value != 0))?;
                } else {
                    let bits: Vec<vcd::Value> =
                        (0..line.width()).rev().map(|i| bit((value >> i) & 1 == 1)).collect();
                    writer.change_vector(*id, &bits)?;
                }
            }
        }

        let half_period = (snapshot.period / 2).max(1);
        writer.timestamp(snapshot.time + half_period)?;
        writer.change_scalar(self.ids[0], vcd::Value::V0)?;

        self.previous = Some(snapshot.state);
        Ok(())
    }
}

enum TraceOutput {
    File(BufWriter<File>),
    Memory(Vec<u8>),
}

impl TraceOutput {
    fn emit(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            TraceOutput::File(file) => {
                file.write_all(bytes)?;
                file.flush()
            }
            TraceOutput::Memory(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
        }
    }
}

/// The recording end shared between a recorder and its model.
pub struct TraceSink {
    open: bool,
    output: Option<TraceOutput>,
    encoder: VcdEncoder,
    scratch: Vec<u8>,
    /// Retained for `TraceDestination::Memory` only
    snapshots: Vec<Snapshot>,
    count: usize,
    first_time: Option<SimTime>,
    last_time: Option<SimTime>,
    bytes: usize,
    error: Option<std::io::Error>,
}

impl TraceSink {
    fn new(mut output: TraceOutput, scope: &str) -> std::io::Result<Self> {
        let mut scratch = Vec::new();
        let encoder = VcdEncoder::begin(&mut scratch, scope)?;
        output.emit(&scratch)?;
        let bytes = scratch.len();
        scratch.clear();

        Ok(Self {
            open: true,
            output: Some(output),
            encoder,
            scratch,
            snapshots: Vec::new(),
            count: 0,
            first_time: None,
            last_time: None,
            bytes,
            error: None,
        })
    }

    /// Returns true until the owning recorder is closed.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Encodes and emits the state seen at the clock edge at `time`.
    ///
    /// After a write error the sink stops recording and the error is
    /// reported when the recorder is closed.
    pub fn record(&mut self, time: SimTime, period: SimTime, state: SignalState) {
        if let Some(last) = self.last_time {
            debug_assert!(time > last, "trace timestamps must strictly increase");
        }
        if self.error.is_some() {
            return;
        }
        let Some(output) = self.output.as_mut() else {
            return;
        };

        let snapshot = Snapshot {
            time,
            period,
            state,
        };
        self.scratch.clear();
        let written = self
            .encoder
            .encode(&mut self.scratch, &snapshot)
            .and_then(|()| output.emit(&self.scratch));
        if let Err(e) = written {
            tracing::error!(time, error = %e, "Trace write failed, recording stopped");
            self.error = Some(e);
            return;
        }

        if matches!(output, TraceOutput::Memory(_)) {
            self.snapshots.push(snapshot);
        }
        self.bytes += self.scratch.len();
        self.count += 1;
        self.first_time.get_or_insert(time);
        self.last_time = Some(time);
    }
}

impl std::fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSink")
            .field("open", &self.open)
            .field("count", &self.count)
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Outcome of closing a recorder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Number of snapshots (stepped cycles) captured
    pub snapshots: usize,
    /// Timestamp of the first snapshot
    pub first_time: Option<SimTime>,
    /// Timestamp of the last snapshot
    pub last_time: Option<SimTime>,
    /// Where the waveform went
    pub destination: TraceDestination,
    /// Size of the VCD written
    pub bytes: usize,
}

/// Records every clock edge of one model instance into a VCD waveform.
pub struct TraceRecorder {
    sink: Arc<Mutex<TraceSink>>,
    destination: TraceDestination,
    closed: bool,
}

impl TraceRecorder {
    /// Attaches a new recorder to `model` and writes the VCD header.
    ///
    /// Fails with `RecordingUnavailable` if the model's context was created
    /// with trace capture disabled, with `TraceAlreadyAttached` if an open
    /// recorder is already attached, and with `Trace` if the file cannot be
    /// created.
    pub fn attach(model: &mut ModelInstance, destination: TraceDestination) -> SimResult<Self> {
        if !model.context().trace_enabled() {
            return Err(SimError::RecordingUnavailable);
        }
        if model.is_traced() {
            return Err(SimError::TraceAlreadyAttached);
        }

        let output = match &destination {
            TraceDestination::File(path) => TraceOutput::File(BufWriter::new(File::create(path)?)),
            TraceDestination::Memory => TraceOutput::Memory(Vec::new()),
        };
        let sink = Arc::new(Mutex::new(TraceSink::new(output, model.core_name())?));
        model.attach_trace(Arc::clone(&sink))?;

        tracing::info!(
            core = model.core_name(),
            destination = ?destination,
            "Trace recorder attached"
        );

        Ok(Self {
            sink,
            destination,
            closed: false,
        })
    }

    /// Returns the destination of the waveform.
    pub fn destination(&self) -> &TraceDestination {
        &self.destination
    }

    /// Number of snapshots recorded so far.
    pub fn snapshot_count(&self) -> usize {
        self.sink.lock().count
    }

    /// Returns a copy of the recorded snapshots.
    ///
    /// Empty for file destinations, which do not retain snapshots.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.sink.lock().snapshots.clone()
    }

    /// Returns the VCD text written so far.
    pub fn render_vcd(&self) -> SimResult<String> {
        let mut sink = self.sink.lock();
        let bytes = match sink.output.as_mut() {
            Some(TraceOutput::Memory(buf)) => buf.clone(),
            Some(TraceOutput::File(file)) => {
                file.flush()?;
                match &self.destination {
                    TraceDestination::File(path) => std::fs::read(path)?,
                    TraceDestination::Memory => Vec::new(),
                }
            }
            None => Vec::new(),
        };
        String::from_utf8(bytes).map_err(|e| {
            SimError::Trace(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Stops recording, flushes the waveform and returns a summary.
    pub fn close(mut self) -> SimResult<TraceSummary> {
        self.finalize()
    }

    fn finalize(&mut self) -> SimResult<TraceSummary> {
        self.closed = true;
        let mut sink = self.sink.lock();
        sink.open = false;

        if let Some(TraceOutput::File(mut file)) = sink.output.take() {
            file.flush()?;
        }
        if let Some(e) = sink.error.take() {
            return Err(SimError::Trace(e));
        }

        let summary = TraceSummary {
            snapshots: sink.count,
            first_time: sink.first_time,
            last_time: sink.last_time,
            destination: self.destination.clone(),
            bytes: sink.bytes,
        };

        tracing::info!(
            snapshots = summary.snapshots,
            bytes = summary.bytes,
            "Trace recorder closed"
        );
        Ok(summary)
    }
}

impl Drop for TraceRecorder {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.finalize() {
            tracing::error!(error = %e, "Failed to finalize trace on drop");
        }
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("destination", &self.destination)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Writes `snapshots` as a complete VCD waveform.
///
/// Produces the same text a recorder streams for the same edges.
pub fn write_vcd<W: Write>(mut out: W, scope: &str, snapshots: &[Snapshot]) -> std::io::Result<()> {
    let mut encoder = VcdEncoder::begin(&mut out, scope)?;
    for snapshot in snapshots {
        encoder.encode(&mut out, snapshot)?;
    }
    out.flush()
}

fn bit(high: bool) -> vcd::Value {
    if high {
        vcd::Value::V1
    } else {
        vcd::Value::V0
    }
}
