// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rust_htslib::bam::{self, record::Cigar, Read};

use crate::assembly::WindowAssembler;
use crate::variants::{CandidateVariant, Evidence, SampleCounts};
use crate::windows::RefWindow;

#[derive(Clone, Copy, Debug)]
pub struct PileupParams {
    pub min_mapq: u8,
    pub min_base_qual: u8,
    /// Minimum alt-supporting tumor reads for a candidate.
    pub min_tumor_support: u32,
    /// Maximum alt-supporting normal reads for a candidate to still count as
    /// somatic.
    pub max_normal_support: u32,
    pub max_indel_length: u32,
}

impl Default for PileupParams {
    fn default() -> Self {
        PileupParams {
            min_mapq: 20,
            min_base_qual: 13,
            min_tumor_support: 3,
            max_normal_support: 1,
            max_indel_length: 500,
        }
    }
}

/// `(pos, ref_allele, alt_allele)` within one window.
type Site = (i64, Vec<u8>, Vec<u8>);

#[derive(Clone, Copy, Debug, Default)]
struct SiteTally {
    fwd: u32,
    rev: u32,
}

impl SiteTally {
    fn total(&self) -> u32 {
        self.fwd + self.rev
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct BaseTally {
    dp: u32,
    ref_fwd: u32,
    ref_rev: u32,
}

#[derive(Debug, Default)]
struct SamplePileup {
    sites: BTreeMap<Site, SiteTally>,
    bases: BTreeMap<i64, BaseTally>,
}

/// The shipped window assembler: a tumor/normal pileup-contrast caller.
/// Each instance owns its own alignment readers (they are not thread-safe),
/// one instance per worker thread. Reads overlapping the window are walked
/// along their CIGAR against the window's reference bases; strand-stratified
/// SNV and short-indel support is tallied per sample and contrasted to call
/// somatic candidates.
pub struct PileupAssembler {
    tumor: bam::IndexedReader,
    normal: bam::IndexedReader,
    params: PileupParams,
}

impl PileupAssembler {
    pub fn from_paths<P: AsRef<Path>>(tumor: P, normal: P, params: PileupParams) -> Result<Self> {
        let open = |path: &Path| {
            bam::IndexedReader::from_path(path)
                .context(format!("unable to open alignment {}", path.display()))
        };
        Ok(PileupAssembler {
            tumor: open(tumor.as_ref())?,
            normal: open(normal.as_ref())?,
            params,
        })
    }
}

impl WindowAssembler for PileupAssembler {
    fn assemble(&mut self, window: &RefWindow) -> Result<Vec<CandidateVariant>> {
        if window.interval().length() == 0 {
            return Ok(Vec::new());
        }

        let tumor = scan_sample(&mut self.tumor, window, &self.params)?;
        let normal = scan_sample(&mut self.normal, window, &self.params)?;

        let mut candidates = Vec::new();
        for (site, tally) in &tumor.sites {
            let normal_tally = normal.sites.get(site).copied().unwrap_or_default();
            if tally.total() < self.params.min_tumor_support
                || normal_tally.total() > self.params.max_normal_support
            {
                continue;
            }

            let (pos, ref_allele, alt_allele) = site.clone();
            let tumor_base = tumor.bases.get(&pos).copied().unwrap_or_default();
            let normal_base = normal.bases.get(&pos).copied().unwrap_or_default();
            candidates.push(CandidateVariant {
                contig: window.interval().contig.clone(),
                pos,
                ref_allele,
                alt_allele,
                evidence: Evidence {
                    tumor: SampleCounts {
                        dp: tumor_base.dp,
                        rd_fwd: tumor_base.ref_fwd,
                        rd_rev: tumor_base.ref_rev,
                        ad_fwd: tally.fwd,
                        ad_rev: tally.rev,
                    },
                    normal: SampleCounts {
                        dp: normal_base.dp,
                        rd_fwd: normal_base.ref_fwd,
                        rd_rev: normal_base.ref_rev,
                        ad_fwd: normal_tally.fwd,
                        ad_rev: normal_tally.rev,
                    },
                },
            });
        }

        Ok(candidates)
    }
}

fn scan_sample(
    reader: &mut bam::IndexedReader,
    window: &RefWindow,
    params: &PileupParams,
) -> Result<SamplePileup> {
    let interval = window.interval();
    let (start, end) = (interval.start, interval.end);
    let tid = reader
        .header()
        .tid(interval.contig.as_bytes())
        .ok_or_else(|| anyhow!("contig {} missing from alignment header", interval.contig))?;
    reader.fetch((tid as i32, start, end))?;

    let window_base =
        |pos: i64| -> u8 { window.sequence()[(pos - start) as usize].to_ascii_uppercase() };

    let mut pileup = SamplePileup::default();
    for record in reader.records() {
        let record = record?;
        if record.mapq() < params.min_mapq
            || record.is_unmapped()
            || record.is_duplicate()
            || record.is_secondary()
            || record.is_supplementary()
            || record.is_quality_check_failed()
        {
            continue;
        }

        let seq = record.seq().as_bytes();
        let seq_len = seq.len();
        let quals = record.qual();
        let reverse = record.is_reverse();
        let mut ref_pos = record.pos();
        let mut read_pos = 0usize;

        for op in record.cigar().iter() {
            match *op {
                Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                    for i in 0..len as i64 {
                        let pos = ref_pos + i;
                        let qpos = read_pos + i as usize;
                        if pos < start || pos >= end || qpos >= seq_len {
                            continue;
                        }
                        let tally = pileup.bases.entry(pos).or_default();
                        tally.dp += 1;
                        if quals[qpos] < params.min_base_qual {
                            continue;
                        }
                        let base = seq[qpos].to_ascii_uppercase();
                        let ref_base = window_base(pos);
                        if base == ref_base {
                            if reverse {
                                tally.ref_rev += 1;
                            } else {
                                tally.ref_fwd += 1;
                            }
                        } else if base != b'N' && ref_base != b'N' {
                            let site = (pos, vec![ref_base], vec![base]);
                            let obs = pileup.sites.entry(site).or_default();
                            if reverse {
                                obs.rev += 1;
                            } else {
                                obs.fwd += 1;
                            }
                        }
                    }
                    ref_pos += i64::from(len);
                    read_pos += len as usize;
                }
                Cigar::Ins(len) => {
                    // anchored at the last reference-consuming base before
                    // the insertion
                    let anchor = ref_pos - 1;
                    let inserted = len as usize;
                    if anchor >= start
                        && anchor < end
                        && read_pos > 0
                        && read_pos + inserted <= seq_len
                        && len <= params.max_indel_length
                    {
                        let min_qual = (read_pos..read_pos + inserted)
                            .map(|i| quals[i])
                            .min()
                            .unwrap_or(0);
                        if min_qual >= params.min_base_qual {
                            let ref_base = window_base(anchor);
                            let mut alt_allele = vec![ref_base];
                            alt_allele
                                .extend((read_pos..read_pos + inserted).map(|i| seq[i].to_ascii_uppercase()));
                            let site = (anchor, vec![ref_base], alt_allele);
                            let obs = pileup.sites.entry(site).or_default();
                            if reverse {
                                obs.rev += 1;
                            } else {
                                obs.fwd += 1;
                            }
                        }
                    }
                    read_pos += inserted;
                }
                Cigar::Del(len) => {
                    let anchor = ref_pos - 1;
                    let deleted = i64::from(len);
                    // deleted reference positions still count as covered
                    for pos in ref_pos..ref_pos + deleted {
                        if pos >= start && pos < end {
                            pileup.bases.entry(pos).or_default().dp += 1;
                        }
                    }
                    // the full deleted span must lie inside the window so
                    // the ref allele can be spelled from the window bases
                    if anchor >= start && ref_pos + deleted <= end && len <= params.max_indel_length
                    {
                        let ref_base = window_base(anchor);
                        let mut ref_allele = vec![ref_base];
                        ref_allele.extend((ref_pos..ref_pos + deleted).map(window_base));
                        let site = (anchor, ref_allele, vec![ref_base]);
                        let obs = pileup.sites.entry(site).or_default();
                        if reverse {
                            obs.rev += 1;
                        } else {
                            obs.fwd += 1;
                        }
                    }
                    ref_pos += deleted;
                }
                Cigar::SoftClip(len) => {
                    read_pos += len as usize;
                }
                Cigar::RefSkip(len) => {
                    ref_pos += i64::from(len);
                }
                Cigar::HardClip(_) | Cigar::Pad(_) => {}
            }
        }
    }

    Ok(pileup)
}
