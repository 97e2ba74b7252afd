//! Operator output channel
//!
//! Human-readable progress, the request echo and the response lines go to an
//! `OperatorSink`. Internal diagnostics go through `tracing` instead.

use std::io::Write;

/// Line-oriented text sink read by the operator
pub trait OperatorSink: Send {
    /// Emit a complete line
    fn line(&mut self, text: &str);

    /// Emit text without ending the line (progress dots)
    fn partial(&mut self, text: &str);
}

/// Writes to standard output
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OperatorSink for ConsoleSink {
    fn line(&mut self, text: &str) {
        println!("{}", text);
    }

    fn partial(&mut self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }
}

/// Collects emitted lines in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Vec<String>,
    pending: String,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Index of the first line equal to `text`
    pub fn position(&self, text: &str) -> Option<usize> {
        self.lines.iter().position(|l| l == text)
    }
}

#[cfg(test)]
impl OperatorSink for MemorySink {
    fn line(&mut self, text: &str) {
        let mut line = std::mem::take(&mut self.pending);
        line.push_str(text);
        self.lines.push(line);
    }

    fn partial(&mut self, text: &str) {
        self.pending.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_joins_partials() {
        let mut sink = MemorySink::new();
        sink.partial(".");
        sink.partial(".");
        sink.line("");
        sink.line("done");

        assert_eq!(sink.lines(), ["..", "done"]);
        assert_eq!(sink.position("done"), Some(1));
    }
}
