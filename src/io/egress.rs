//! Feed egress - writes enriched events to file
//!
//! Each enriched event is written as its own single-feature feed, one JSON
//! object per line (JSONL), to the file specified in config.

use crate::domain::event::EnrichedEvent;
use anyhow::Context;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for enriched feeds
pub struct FeedEgress {
    file_path: String,
}

impl FeedEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write one enriched event; returns true if successful
    pub fn write_event(&self, enriched: &EnrichedEvent) -> bool {
        let result = serde_json::to_string(&enriched.to_feed())
            .context("failed to encode enriched feed")
            .and_then(|json| self.append_line(&json));

        match result {
            Ok(()) => {
                debug!(
                    event_id = %enriched.id(),
                    source = %enriched.source_kind(),
                    source_id = %enriched.provenance.source_id,
                    "enriched_event_egressed"
                );
                true
            }
            Err(e) => {
                error!(
                    event_id = %enriched.id(),
                    error = %format!("{e:#}"),
                    "enriched_event_egress_failed"
                );
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> anyhow::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", self.file_path))?;

        writeln!(file, "{}", line).with_context(|| format!("failed to write {}", self.file_path))?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }

    /// Write a batch; returns how many were written
    pub fn write_events(&self, events: &[EnrichedEvent]) -> usize {
        let written = events.iter().filter(|enriched| self.write_event(enriched)).count();
        info!(file = %self.file_path, written = %written, total = %events.len(), "egress_batch_written");
        written
    }
}
