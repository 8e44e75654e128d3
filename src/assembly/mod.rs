pub mod pileup;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam::channel::{Receiver, Sender};
use log::error;

use crate::variants::CandidateVariant;
use crate::windows::RefWindow;

/// The window-level assembly seam of the pipeline. Implementations must be
/// deterministic per (window, params) and self-contained: no cross-window
/// state, so the pool may process windows in any order. Handles that are not
/// thread-safe (e.g. alignment readers) are owned per instance, one instance
/// per worker thread.
pub trait WindowAssembler {
    fn assemble(&mut self, window: &RefWindow) -> Result<Vec<CandidateVariant>>;
}

/// Result of assembling a single window, tagged with the window's global
/// schedule index.
#[derive(Clone, Debug)]
pub struct WindowResult {
    pub window_idx: u64,
    pub variants: Vec<CandidateVariant>,
    pub runtime: Duration,
}

/// One worker of the assembler pool: drains the shared window queue, runs
/// the assembler, and reports per-window results. Assembly failures are
/// converted into empty results so the driver's completion count advances
/// regardless; they never cross the thread boundary.
pub struct MicroAssembler<A> {
    assembler: A,
    window_rx: Receiver<Arc<RefWindow>>,
    result_tx: Sender<WindowResult>,
}

impl<A: WindowAssembler> MicroAssembler<A> {
    pub fn new(
        assembler: A,
        window_rx: Receiver<Arc<RefWindow>>,
        result_tx: Sender<WindowResult>,
    ) -> Self {
        MicroAssembler {
            assembler,
            window_rx,
            result_tx,
        }
    }

    /// Runs until the window queue is drained and disconnected.
    pub fn process(mut self) {
        while let Ok(window) = self.window_rx.recv() {
            let start = Instant::now();
            let variants = match self.assembler.assemble(&window) {
                Ok(variants) => variants,
                Err(e) => {
                    error!(
                        "assembly failed for window {}: {:#}",
                        window.region_string(),
                        e
                    );
                    Vec::new()
                }
            };
            let result = WindowResult {
                window_idx: *window.index(),
                variants,
                runtime: start.elapsed(),
            };
            if self.result_tx.send(result).is_err() {
                // driver hung up early; nothing left to report to
                break;
            }
        }
    }
}
