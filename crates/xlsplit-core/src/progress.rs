//! Progress reporting while parts are transcribed.

use std::time::{Duration, Instant};

use crate::partition::PartRange;

/// Rows between progress events inside a part (the first and last rows always report).
pub const REPORT_EVERY: u32 = 25;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Fraction of the whole split in `[0, 1]`.
    pub overall: f64,
    /// 1-based part number.
    pub part: usize,
    pub total_parts: usize,
    pub rows_done: u32,
    pub rows_total: u32,
    pub elapsed: Duration,
}

pub trait ProgressSink {
    fn report(&mut self, event: &ProgressEvent);
}

impl<F: FnMut(&ProgressEvent)> ProgressSink for F {
    fn report(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Throttles row ticks into [`ProgressEvent`]s for an optional sink.
pub struct ProgressTracker<'s> {
    sink: Option<&'s mut dyn ProgressSink>,
    total_parts: usize,
    started: Instant,
}

impl<'s> ProgressTracker<'s> {
    pub fn new(sink: Option<&'s mut dyn ProgressSink>, total_parts: usize) -> Self {
        Self {
            sink,
            total_parts,
            started: Instant::now(),
        }
    }

    /// A data row of `part` was written; `row` is 1-based within the part.
    pub fn row_written(&mut self, part: &PartRange, row: u32) {
        let total = part.len();
        if row == 1 || row == total || row % REPORT_EVERY == 0 {
            self.emit(part, row);
        }
    }

    /// `part` has been serialized.
    pub fn part_finished(&mut self, part: &PartRange) {
        self.emit(part, part.len());
    }

    fn emit(&mut self, part: &PartRange, rows_done: u32) {
        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };
        let rows_total = part.len();
        let parts = self.total_parts.max(1) as f64;
        let overall =
            (part.index as f64 + f64::from(rows_done) / f64::from(rows_total.max(1))) / parts;
        sink.report(&ProgressEvent {
            overall: overall.clamp(0.0, 1.0),
            part: part.number(),
            total_parts: self.total_parts,
            rows_done,
            rows_total,
            elapsed: self.started.elapsed(),
        });
    }
}
