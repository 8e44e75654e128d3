// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use itertools::Itertools;

use crate::assembly::WindowResult;
use crate::genome::ContigTable;
use crate::variants::vcf::VariantSink;
use crate::variants::{CandidateVariant, VariantKey};

/// Accumulates candidate variants per source window and flushes them in
/// genomic order, deduplicating across overlapping windows. The driver is
/// the only thread that touches the store; flushing a window is legal once
/// the look-ahead of neighboring windows has completed, so that every
/// overlapping rediscovery of a variant is buffered before its key is
/// sealed.
#[derive(Debug, Default)]
pub struct VariantStore {
    by_window: BTreeMap<u64, Vec<CandidateVariant>>,
    seen: HashSet<VariantKey>,
}

impl VariantStore {
    pub fn new() -> Self {
        VariantStore::default()
    }

    /// Number of windows with still-buffered candidates.
    pub fn pending_windows(&self) -> usize {
        self.by_window.len()
    }

    pub fn insert(&mut self, result: WindowResult) {
        let prev = self.by_window.insert(result.window_idx, result.variants);
        assert!(
            prev.is_none(),
            "window {} reported more than one result",
            result.window_idx
        );
    }

    /// Moves the candidates stored under `idx`, together with any equal-key
    /// duplicates still buffered under other windows, into the sink. Keys
    /// that were already flushed are dropped; among buffered duplicates the
    /// strongest evidence wins. Returns whether anything was written.
    pub fn flush_window<S: VariantSink>(
        &mut self,
        idx: u64,
        sink: &mut S,
        contigs: &ContigTable,
    ) -> Result<bool> {
        let candidates = match self.by_window.remove(&idx) {
            Some(candidates) => candidates,
            None => return Ok(false),
        };

        let mut best: HashMap<VariantKey, CandidateVariant> =
            HashMap::with_capacity(candidates.len());
        for candidate in candidates {
            if self.seen.contains(&candidate.key()) {
                continue;
            }
            keep_strongest(&mut best, candidate);
        }

        // Consume duplicates buffered under later windows; iteration is in
        // ascending window order so ties resolve deterministically.
        for variants in self.by_window.values_mut() {
            let mut kept = Vec::with_capacity(variants.len());
            for candidate in variants.drain(..) {
                if best.contains_key(&candidate.key()) {
                    keep_strongest(&mut best, candidate);
                } else {
                    kept.push(candidate);
                }
            }
            *variants = kept;
        }

        let mut retained = best.into_iter().map(|(_, v)| v).collect_vec();
        retained.sort_by(|a, b| {
            let rank = |v: &CandidateVariant| {
                (
                    contigs
                        .id(&v.contig)
                        .expect("candidate contig missing from contig table"),
                    v.pos,
                )
            };
            rank(a)
                .cmp(&rank(b))
                .then_with(|| a.ref_allele.cmp(&b.ref_allele))
                .then_with(|| a.alt_allele.cmp(&b.alt_allele))
        });

        for variant in &retained {
            sink.write(variant)?;
            self.seen.insert(variant.key());
        }

        Ok(!retained.is_empty())
    }

    /// Flushes every remaining window in ascending index order.
    pub fn flush_all<S: VariantSink>(&mut self, sink: &mut S, contigs: &ContigTable) -> Result<()> {
        let pending = self.by_window.keys().copied().collect_vec();
        for idx in pending {
            self.flush_window(idx, sink, contigs)?;
        }
        Ok(())
    }
}

fn keep_strongest(best: &mut HashMap<VariantKey, CandidateVariant>, candidate: CandidateVariant) {
    match best.entry(candidate.key()) {
        Entry::Occupied(mut entry) => {
            if candidate.evidence.is_stronger_than(&entry.get().evidence) {
                entry.insert(candidate);
            }
        }
        Entry::Vacant(entry) => {
            entry.insert(candidate);
        }
    }
}
