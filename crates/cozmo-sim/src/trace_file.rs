use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use cozmo_tools::{TraceEvent, TraceSink};

/// Streams trace events to a JSON-lines file.
pub struct JsonlTraceSink {
    out: BufWriter<File>,
    written: usize,
    failed: bool,
}

impl JsonlTraceSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
            written: 0,
            failed: false,
        })
    }

    fn write(&mut self, event: &TraceEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.out, "{line}")?;
        Ok(())
    }
}

impl TraceSink for JsonlTraceSink {
    fn emit(&mut self, event: TraceEvent) {
        if self.failed {
            return;
        }
        match self.write(&event) {
            Ok(()) => self.written += 1,
            Err(err) => {
                // one warning, then stop trying
                tracing::warn!(error = %err, "trace output failed");
                self.failed = true;
            }
        }
    }
}

impl Drop for JsonlTraceSink {
    fn drop(&mut self) {
        if let Err(err) = self.out.flush() {
            tracing::warn!(error = %err, "failed to flush trace output");
        }
        tracing::debug!(events = self.written, "trace output closed");
    }
}
