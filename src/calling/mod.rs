// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use crossbeam::channel::bounded;
use crossbeam::thread;
use derive_builder::Builder;
use log::{debug, info};

use crate::assembly::{MicroAssembler, WindowAssembler};
use crate::genome::ContigTable;
use crate::reference::ReferenceRead;
use crate::variants::store::VariantStore;
use crate::variants::vcf::VariantSink;
use crate::windows::{RefWindow, WindowBuilder};

/// Number of consecutive completed windows required beyond the flush cursor
/// before a window's variants may leave the store: any variant discoverable
/// by an overlapping window must be buffered before its key is sealed. The
/// factor 3 conservatively covers two-sided overlap plus the largest indel
/// span.
pub(crate) fn required_buffer_windows(
    max_indel_length: u32,
    window_length: u32,
    pct_overlap: u32,
) -> usize {
    let max_flank = f64::from(max_indel_length.max(window_length));
    let step = WindowBuilder::step_size(pct_overlap, window_length) as f64;
    (3.0 * max_flank / step).ceil() as usize
}

/// Whether the look-ahead `[next, next + width)` has fully reported, i.e.
/// window `next` may be flushed.
pub(crate) fn flush_ready(done: &[bool], next: usize, width: usize) -> bool {
    next + width <= done.len() && done[next..next + width].iter().all(|d| *d)
}

/// The pipeline driver: builds the window list, feeds it to a pool of
/// assembler workers over a bounded queue, and reassembles the concurrent
/// results into a globally ordered, deduplicated output stream. The variant
/// store and the sink are driver-only; workers communicate exclusively via
/// the result queue.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Caller<R, A, S>
where
    R: ReferenceRead,
    A: WindowAssembler + Send,
    S: VariantSink,
{
    reference: R,
    contigs: ContigTable,
    sink: S,
    /// One assembler per worker thread.
    assemblers: Vec<A>,
    #[builder(default)]
    regions: Vec<String>,
    #[builder(default)]
    bed_path: Option<PathBuf>,
    region_padding: u32,
    window_length: u32,
    pct_overlap: u32,
    max_indel_length: u32,
    #[builder(default)]
    skip_truncated: bool,
}

impl<R, A, S> Caller<R, A, S>
where
    R: ReferenceRead,
    A: WindowAssembler + Send,
    S: VariantSink,
{
    fn build_windows(&self) -> Result<Vec<Arc<RefWindow>>> {
        let mut builder =
            WindowBuilder::new(self.region_padding, self.window_length, self.pct_overlap)?;
        for region in &self.regions {
            builder.add_region(region)?;
        }
        if let Some(ref bed) = self.bed_path {
            builder.add_bed_regions(bed)?;
        }
        if builder.is_empty() {
            info!("no input regions provided, using all reference contigs as input");
            builder.add_all_reference_contigs(&self.reference);
        }
        info!("building reference windows from {} input regions", builder.len());
        builder.build(&self.contigs, &self.reference, self.skip_truncated)
    }

    pub fn call(mut self) -> Result<()> {
        let timer = Instant::now();
        let windows = self.build_windows()?;
        let num_total = windows.len();
        let buffer_width =
            required_buffer_windows(self.max_indel_length, self.window_length, self.pct_overlap);

        let assemblers = std::mem::take(&mut self.assemblers);
        assert!(!assemblers.is_empty(), "worker pool must not be empty");
        let contigs = &self.contigs;
        let sink = &mut self.sink;

        info!(
            "processing {} windows in {} assembler thread(s)",
            num_total,
            assemblers.len()
        );
        debug!("flush look-ahead is {} windows", buffer_width);

        // Bulk-enqueue every window up front: with capacity equal to the
        // window count the startup producer never blocks, and dropping the
        // sender lets drained workers exit.
        let (window_tx, window_rx) = bounded(num_total.max(1));
        let (result_tx, result_rx) = bounded(num_total.max(1));
        for window in &windows {
            window_tx
                .send(Arc::clone(window))
                .map_err(|_| anyhow!("window queue rejected bulk enqueue"))?;
        }
        drop(window_tx);

        let mut store = VariantStore::new();
        let mut done = vec![false; num_total];
        let mut next_to_flush: usize = 0;
        let mut num_done: usize = 0;

        thread::scope(|scope| -> Result<()> {
            for assembler in assemblers {
                let worker =
                    MicroAssembler::new(assembler, window_rx.clone(), result_tx.clone());
                scope.spawn(move |_| worker.process());
            }
            drop(window_rx);
            drop(result_tx);

            while num_done < num_total {
                let result = result_rx
                    .recv()
                    .map_err(|_| anyhow!("result queue closed before all windows completed"))?;
                let idx = result.window_idx as usize;
                let runtime = result.runtime;
                done[idx] = true;
                num_done += 1;
                store.insert(result);
                info!(
                    "progress: {:.3}% | {} of {} done | window {} processed in {:.2?}",
                    100.0 * num_done as f64 / num_total as f64,
                    num_done,
                    num_total,
                    windows[idx].region_string(),
                    runtime
                );

                while flush_ready(&done, next_to_flush, buffer_width) {
                    if store.flush_window(next_to_flush as u64, sink, contigs)? {
                        debug!(
                            "flushed variants from {} to output",
                            windows[next_to_flush].region_string()
                        );
                        sink.flush()?;
                    }
                    next_to_flush += 1;
                }
            }

            Ok(())
        })
        .map_err(|_| anyhow!("assembler worker panicked"))??;

        store.flush_all(&mut self.sink, &self.contigs)?;
        self.sink.flush()?;
        self.sink.close()?;
        info!(
            "successfully completed calling pipeline | runtime={:.2?}",
            timer.elapsed()
        );
        Ok(())
    }
}
