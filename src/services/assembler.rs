//! Feed assembly: one enriched copy per planned event
//!
//! Enrichment sets are folded in ascending source priority, so a higher
//! priority source replaces whatever a lower one produced for the same
//! event. Output keeps the order in which event ids were first seen.

use crate::domain::event::EnrichedEvent;
use crate::domain::observation::SourceKind;
use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct FeedAssembler {
    slots: Vec<EnrichedEvent>,
    by_id: FxHashMap<String, usize>,
}

impl FeedAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the entry for this event id
    pub fn overlay(&mut self, enriched: EnrichedEvent) {
        match self.by_id.get(enriched.id()).copied() {
            Some(slot) => {
                debug!(
                    event_id = %enriched.id(),
                    replaced = %self.slots[slot].source_kind(),
                    by = %enriched.source_kind(),
                    "enrichment_replaced"
                );
                self.slots[slot] = enriched;
            }
            None => {
                self.by_id.insert(enriched.id().to_string(), self.slots.len());
                self.slots.push(enriched);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn finish(self) -> Vec<EnrichedEvent> {
        self.slots
    }
}

/// Merge per-source results, lowest priority first
pub fn assemble(mut by_source: FxHashMap<SourceKind, Vec<EnrichedEvent>>) -> Vec<EnrichedEvent> {
    let mut assembler = FeedAssembler::new();
    for kind in SourceKind::PRIORITY {
        for enriched in by_source.remove(&kind).unwrap_or_default() {
            assembler.overlay(enriched);
        }
    }
    assembler.finish()
}
