use crate::types::Finding;
use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// FindingSink
///
/// A generic trait across finding destinations.
///
/// Sinks receive findings in emission order. A sink error aborts the
/// trace that is feeding it.
pub trait FindingSink {
    fn record(&mut self, finding: Finding) -> Result<()>;
}

/// VecSink
///
/// Collects findings in memory, in emission order.
#[derive(Debug, Default)]
pub struct VecSink {
    findings: Vec<Finding>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}

impl FindingSink for VecSink {
    fn record(&mut self, finding: Finding) -> Result<()> {
        self.findings.push(finding);
        Ok(())
    }
}

/// JsonLinesSink
///
/// Writes one JSON object per finding, one finding per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> FindingSink for JsonLinesSink<W> {
    fn record(&mut self, finding: Finding) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &finding)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// TextLogSink
///
/// Writes pipe-separated rows, one per finding.
pub struct TextLogSink<W: Write> {
    writer: W,
}

impl<W: Write> TextLogSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl TextLogSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> FindingSink for TextLogSink<W> {
    fn record(&mut self, finding: Finding) -> Result<()> {
        writeln!(self.writer, "{finding}")?;
        Ok(())
    }
}
