//! Destinations for per-line timing records.
//!
//! The sweep never fails and always runs to completion, so sinks cannot abort it.
//! Sinks that can fail, like [`DiagnosticWriter`], keep the first error and report
//! it when they are finished.

use std::io::Write;

use crate::sweep::LineTiming;

/// Receives one [`LineTiming`] per cache line visited, in visitation order.
pub trait TimingSink {
    /// Records the timing of one cache line.
    fn record(&mut self, timing: LineTiming);
}

impl TimingSink for Vec<LineTiming> {
    fn record(&mut self, timing: LineTiming) {
        self.push(timing);
    }
}

impl<T: TimingSink + ?Sized> TimingSink for &mut T {
    fn record(&mut self, timing: LineTiming) {
        (**self).record(timing);
    }
}

/// Forwards every record to both sinks.
impl<A: TimingSink, B: TimingSink> TimingSink for (A, B) {
    fn record(&mut self, timing: LineTiming) {
        self.0.record(timing);
        self.1.record(timing);
    }
}

/// Sink that drops all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl TimingSink for Discard {
    fn record(&mut self, _timing: LineTiming) {}
}

/// Writes one human-readable diagnostic line per record.
///
/// After the first write error all further records are dropped; the error is
/// returned from [`DiagnosticWriter::finish`].
pub struct DiagnosticWriter<W: Write> {
    writer: W,
    written: usize,
    error: Option<std::io::Error>,
}

impl<W: Write> DiagnosticWriter<W> {
    /// Creates a diagnostic writer on top of `writer`.
    pub fn new(writer: W) -> Self {
        DiagnosticWriter {
            writer,
            written: 0,
            error: None,
        }
    }

    /// Flushes the writer and returns the number of lines written.
    ///
    /// # Errors
    ///
    /// Returns the first error that occurred while writing or flushing.
    pub fn finish(mut self) -> std::io::Result<usize> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.writer.flush()?;
        Ok(self.written)
    }
}

impl<W: Write> TimingSink for DiagnosticWriter<W> {
    fn record(&mut self, timing: LineTiming) {
        if self.error.is_some() {
            return;
        }
        match writeln!(self.writer, "{}", timing) {
            Ok(()) => self.written += 1,
            Err(e) => self.error = Some(e),
        }
    }
}
