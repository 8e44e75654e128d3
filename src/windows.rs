// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use getset::Getters;
use log::warn;

use crate::errors::Error;
use crate::genome::{ContigTable, GenomicInterval};
use crate::reference::{self, ReferenceRead};

/// A reference window: a genomic interval together with its reference bases
/// and its position in the globally sorted window list. The index uniquely
/// identifies the window for the lifetime of the run and is the schedule key
/// of the whole pipeline.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct RefWindow {
    interval: GenomicInterval,
    index: u64,
    sequence: Vec<u8>,
}

impl RefWindow {
    pub fn region_string(&self) -> String {
        self.interval.to_string()
    }
}

/// Turns input regions (samtools region strings, BED records, or whole
/// reference contigs) into the padded, overlapping, globally indexed window
/// list consumed by the assembler pool.
#[derive(Debug)]
pub struct WindowBuilder {
    region_padding: u32,
    window_length: u32,
    pct_overlap: u32,
    input_regions: Vec<GenomicInterval>,
}

impl WindowBuilder {
    pub fn new(region_padding: u32, window_length: u32, pct_overlap: u32) -> Result<Self, Error> {
        if pct_overlap >= 100 {
            return Err(Error::InvalidOverlap { pct: pct_overlap });
        }
        if Self::step_size(pct_overlap, window_length) < 1 {
            return Err(Error::InvalidStepSize {
                window_length,
                pct_overlap,
            });
        }
        Ok(WindowBuilder {
            region_padding,
            window_length,
            pct_overlap,
            input_regions: Vec::new(),
        })
    }

    /// Stride between successive window starts. Rounded so that steps always
    /// move in multiples of 100.
    pub fn step_size(pct_overlap: u32, window_length: u32) -> i64 {
        let raw = f64::from(100 - pct_overlap) / 100.0 * f64::from(window_length);
        ((raw / 100.0).round() * 100.0) as i64
    }

    pub fn add_region(&mut self, region_str: &str) -> Result<(), Error> {
        self.input_regions.push(parse_region(region_str)?);
        Ok(())
    }

    pub fn add_bed_regions<P: AsRef<Path>>(&mut self, bed: P) -> Result<()> {
        let reader = BufReader::new(fs::File::open(bed)?);
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_num = i + 1;
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split('\t').filter(|t| !t.is_empty()).collect();
            if tokens.len() != 3 {
                return Err(Error::InvalidBedLine {
                    line: line_num,
                    columns: tokens.len(),
                }
                .into());
            }
            let parse = |token: &str| -> Result<i64, Error> {
                token.parse().map_err(|_| Error::InvalidBedRecord {
                    line: line_num,
                    content: line.clone(),
                })
            };
            // bed records are 0-based half-open already
            let start = parse(tokens[1])?;
            let end = parse(tokens[2])?;
            self.input_regions
                .push(GenomicInterval::new(tokens[0], start, end));
        }
        Ok(())
    }

    /// Synthesize one region per reference contig, used when no region input
    /// was supplied.
    pub fn add_all_reference_contigs<R: ReferenceRead>(&mut self, reader: &R) {
        for (name, length) in reader.contigs() {
            self.input_regions
                .push(GenomicInterval::new(name, 0, length as i64));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input_regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.input_regions.len()
    }

    /// Pad, tile, fetch and sort: the resulting windows are ordered by
    /// `(contig id, start, end)` and carry dense indices `0..n`.
    pub fn build<R: ReferenceRead>(
        &self,
        contigs: &ContigTable,
        reader: &R,
        skip_truncated: bool,
    ) -> Result<Vec<Arc<RefWindow>>> {
        if self.input_regions.is_empty() {
            return Err(Error::NoInputRegions.into());
        }

        let step_size = Self::step_size(self.pct_overlap, self.window_length);
        let window_length = i64::from(self.window_length);
        let mut results: Vec<RefWindow> = Vec::new();

        let push_window = |interval: GenomicInterval, results: &mut Vec<RefWindow>| -> Result<()> {
            match reader.region_sequence(&interval) {
                Ok(sequence) => {
                    results.push(RefWindow {
                        interval,
                        index: 0,
                        sequence,
                    });
                    Ok(())
                }
                Err(e) if skip_truncated && reference::is_truncation(&e) => {
                    warn!(
                        "skipping window {} with truncated reference sequence in fasta",
                        interval
                    );
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        for region in &self.input_regions {
            if !contigs.contains(&region.contig) {
                return Err(Error::UnknownContig {
                    contig: region.contig.clone(),
                }
                .into());
            }

            let contig_end = reader.contig_length(&region.contig)? as i64;
            let padded = self.pad(region, contig_end);

            if padded.length() <= window_length {
                push_window(padded, &mut results)?;
                continue;
            }

            // The loop bound is the unpadded region end, so trailing padding
            // never spawns a window of its own. A missing end parses to a
            // sentinel and resolves to the contig length here, as does an
            // explicit end beyond the contig.
            let region_end = region.end.min(contig_end);
            let mut curr_start = padded.start;
            while curr_start < region_end {
                let curr_end = (curr_start + window_length).min(contig_end);
                let interval = GenomicInterval::new(region.contig.clone(), curr_start, curr_end);
                let interior = curr_start + window_length <= contig_end;
                let before = results.len();
                push_window(interval, &mut results)?;
                if interior && results.len() > before {
                    debug_assert_eq!(
                        results.last().unwrap().sequence.len() as i64,
                        window_length
                    );
                }
                curr_start += step_size;
            }
        }

        results.sort_by(|a, b| {
            let key = |w: &RefWindow| {
                (
                    contigs.id(&w.interval.contig).unwrap(),
                    w.interval.start,
                    w.interval.end,
                )
            };
            key(a).cmp(&key(b))
        });
        for (index, window) in results.iter_mut().enumerate() {
            window.index = index as u64;
        }

        Ok(results.into_iter().map(Arc::new).collect())
    }

    /// Symmetric padding, clamped at the contig boundaries. An end within
    /// `region_padding` of the contig end snaps to the contig end.
    fn pad(&self, region: &GenomicInterval, contig_end: i64) -> GenomicInterval {
        let padding = i64::from(self.region_padding);
        let start_underflows = region.start < padding;
        let end_overflows = region.end >= contig_end || contig_end - region.end < padding;
        let start = if start_underflows {
            0
        } else {
            region.start - padding
        }
        .min(contig_end);
        let end = if end_overflows {
            contig_end
        } else {
            region.end + padding
        };
        GenomicInterval::new(region.contig.clone(), start, end.max(start))
    }
}

/// Parses a samtools-style region string `CONTIG[:START[-END]]` with 1-based
/// inclusive coordinates.
fn parse_region(region_str: &str) -> Result<GenomicInterval, Error> {
    let invalid = || Error::InvalidRegion {
        region: region_str.to_owned(),
    };

    let tokens: Vec<&str> = region_str.split(|c| c == ':' || c == '-').collect();
    if tokens.is_empty() || tokens.len() > 3 || tokens[0].is_empty() {
        return Err(invalid());
    }

    let mut start = 0;
    let mut end = i64::MAX;

    if tokens.len() >= 2 {
        let raw: i64 = tokens[1].parse().map_err(|_| invalid())?;
        start = (raw - 1).max(0);
    }
    if tokens.len() == 3 {
        let raw: i64 = tokens[2].parse().map_err(|_| invalid())?;
        end = raw - 1;
    }

    Ok(GenomicInterval::new(tokens[0], start, end))
}
