//! NDJSON (newline-delimited JSON) stream sink.
//!
//! Each row is serialized straight into the buffered writer, no
//! intermediate `String`.
//!
//! ```ignore
//! let mut sink = JsonStreamSink::stdout();
//! sink.write_rows(&report.to_rows(&events))?;
//! sink.finish()?;
//! ```

use super::SinkRow;
use std::io::{self, BufWriter, Write};

/// Writes [`SinkRow`]s as one JSON object per line.
pub struct JsonStreamSink<W: Write> {
    writer: BufWriter<W>,
    rows_written: usize,
}

impl JsonStreamSink<io::Stdout> {
    /// Write NDJSON to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonStreamSink<W> {
    /// Wraps any writer (file, `Vec<u8>`, ...).
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
            rows_written: 0,
        }
    }

    /// Serialize one row followed by a newline.
    pub fn write_row(&mut self, row: &SinkRow) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }

    /// Write a batch of rows in order.
    pub fn write_rows(&mut self, rows: &[SinkRow]) -> io::Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Flush and return how many rows were written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }

    /// Number of rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}
