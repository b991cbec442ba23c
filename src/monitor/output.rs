//! Tick renderers: CSV for live plotting, JSON lines for log shippers.

use std::io::Write;

use anyhow::Result;
use chrono::SecondsFormat;

use super::Tick;

pub trait TickSink {
    fn emit(&mut self, tick: &Tick) -> Result<()>;
}

/// One CSV row per tick; the header is written before the first row. `status`
/// is the per-sample verdict against the monitor threshold, `state` the
/// watchdog state after the sample.
pub struct CsvSink<W: Write> {
    out: W,
    header_written: bool,
}

impl<W: Write> CsvSink<W> {
    pub const HEADER: &'static str = "timestamp,status,score,cpu,jitter,memory,state";

    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TickSink for CsvSink<W> {
    fn emit(&mut self, tick: &Tick) -> Result<()> {
        if !self.header_written {
            writeln!(self.out, "{}", Self::HEADER)?;
            self.header_written = true;
        }
        writeln!(
            self.out,
            "{},{},{:.4},{:.2},{:.2},{:.2},{}",
            tick.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            tick.verdict,
            tick.score,
            tick.metrics.cpu,
            tick.metrics.jitter,
            tick.metrics.memory,
            tick.state,
        )?;
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON object per watchdog event. Ticks without events produce no output.
pub struct EventSink<W: Write> {
    out: W,
}

impl<W: Write> EventSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TickSink for EventSink<W> {
    fn emit(&mut self, tick: &Tick) -> Result<()> {
        for event in &tick.events {
            let line = serde_json::json!({
                "level": event.severity(),
                "time": event.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true),
                "msg": event.message(),
                "event": event.kind(),
                "score": event.score(),
                "verdict": tick.verdict,
                "state": tick.state,
                "metrics": tick.metrics,
            });
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()?;
        Ok(())
    }
}
