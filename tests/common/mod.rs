use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;

use trephine::assembly::WindowAssembler;
use trephine::errors::Error;
use trephine::genome::{ContigTable, GenomicInterval};
use trephine::reference::ReferenceRead;
use trephine::variants::vcf::VariantSink;
use trephine::variants::{CandidateVariant, Evidence, SampleCounts};
use trephine::windows::RefWindow;
use trephine::CallerBuilder;

/// In-memory reference: every contig is an `ACGT` repeat of the declared
/// length, optionally with fewer actual bases than the index claims (to
/// exercise the truncation path).
pub struct TestReference {
    contigs: Vec<(String, u64)>,
    truncated: Option<(String, u64)>,
}

impl TestReference {
    pub fn new(contigs: &[(&str, u64)]) -> Self {
        TestReference {
            contigs: contigs
                .iter()
                .map(|(name, len)| ((*name).to_owned(), *len))
                .collect(),
            truncated: None,
        }
    }

    pub fn with_truncated(mut self, contig: &str, actual: u64) -> Self {
        self.truncated = Some((contig.to_owned(), actual));
        self
    }

    pub fn table(&self) -> ContigTable {
        ContigTable::new(&self.contigs)
    }
}

impl ReferenceRead for TestReference {
    fn contigs(&self) -> Vec<(String, u64)> {
        self.contigs.clone()
    }

    fn contig_length(&self, contig: &str) -> Result<u64> {
        self.contigs
            .iter()
            .find(|(name, _)| name == contig)
            .map(|(_, len)| *len)
            .ok_or_else(|| {
                Error::UnknownContig {
                    contig: contig.to_owned(),
                }
                .into()
            })
    }

    fn region_sequence(&self, interval: &GenomicInterval) -> Result<Vec<u8>> {
        let declared = self.contig_length(&interval.contig)?;
        let actual = match &self.truncated {
            Some((name, actual)) if *name == interval.contig => *actual,
            _ => declared,
        };
        if interval.end as u64 > actual {
            return Err(Error::TruncatedSequence {
                region: interval.to_string(),
                expected: interval.end as u64,
                actual,
            }
            .into());
        }
        Ok((interval.start..interval.end)
            .map(|pos| b"ACGT"[(pos % 4) as usize])
            .collect())
    }
}

#[derive(Clone, Debug)]
pub struct PlantedSite {
    pub contig: String,
    pub pos: i64,
    pub ref_allele: Vec<u8>,
    pub alt_allele: Vec<u8>,
    pub base_support: u32,
}

pub fn site(contig: &str, pos: i64, alt: &[u8], base_support: u32) -> PlantedSite {
    PlantedSite {
        contig: contig.to_owned(),
        pos,
        ref_allele: b"A".to_vec(),
        alt_allele: alt.to_vec(),
        base_support,
    }
}

/// Deterministic stand-in for the window assembler: emits every planted site
/// covered by the window. The reported support varies with the offset of the
/// site inside the window, so overlapping windows disagree and the
/// strongest-evidence rule is exercised. With jitter enabled each window
/// additionally sleeps a pseudo-random duration, shuffling completion order
/// across worker threads.
#[derive(Clone)]
pub struct SiteAssembler {
    sites: Arc<Vec<PlantedSite>>,
    jitter: bool,
}

impl SiteAssembler {
    pub fn new(sites: Vec<PlantedSite>, jitter: bool) -> Self {
        SiteAssembler {
            sites: Arc::new(sites),
            jitter,
        }
    }
}

/// Support reported for a planted site by the window starting at
/// `window_start`.
pub fn window_support(base_support: u32, pos: i64, window_start: i64) -> u32 {
    base_support + ((pos - window_start) % 7) as u32
}

impl WindowAssembler for SiteAssembler {
    fn assemble(&mut self, window: &RefWindow) -> Result<Vec<CandidateVariant>> {
        if self.jitter {
            let ms = window.index().wrapping_mul(2_654_435_761) % 7;
            thread::sleep(Duration::from_millis(ms));
        }

        let interval = window.interval();
        let mut variants = Vec::new();
        for planted in self.sites.iter() {
            if planted.contig != interval.contig
                || planted.pos < interval.start
                || planted.pos >= interval.end
            {
                continue;
            }
            let support = window_support(planted.base_support, planted.pos, interval.start);
            variants.push(CandidateVariant {
                contig: planted.contig.clone(),
                pos: planted.pos,
                ref_allele: planted.ref_allele.clone(),
                alt_allele: planted.alt_allele.clone(),
                evidence: Evidence {
                    tumor: SampleCounts {
                        dp: support + 20,
                        rd_fwd: 10,
                        rd_rev: 10,
                        ad_fwd: support,
                        ad_rev: 0,
                    },
                    normal: SampleCounts {
                        dp: 30,
                        rd_fwd: 15,
                        rd_rev: 15,
                        ad_fwd: 0,
                        ad_rev: 0,
                    },
                },
            });
        }
        Ok(variants)
    }
}

/// Sink that records written variants behind a shared handle, so the caller
/// of the pipeline can inspect them after the sink was moved into the driver.
#[derive(Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<CandidateVariant>>>,
}

impl RecordingSink {
    pub fn handle(&self) -> Arc<Mutex<Vec<CandidateVariant>>> {
        Arc::clone(&self.records)
    }
}

impl VariantSink for RecordingSink {
    fn write(&mut self, variant: &CandidateVariant) -> Result<()> {
        self.records.lock().unwrap().push(variant.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct PipelineConfig {
    pub regions: Vec<String>,
    pub threads: usize,
    pub jitter: bool,
    pub skip_truncated: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            regions: Vec::new(),
            threads: 1,
            jitter: false,
            skip_truncated: false,
        }
    }
}

/// Runs the full pipeline over the given reference and planted sites and
/// returns the records in emission order.
pub fn run_pipeline(
    reference: TestReference,
    sites: Vec<PlantedSite>,
    config: PipelineConfig,
) -> Result<Vec<CandidateVariant>> {
    let contigs = reference.table();
    let sink = RecordingSink::default();
    let records = sink.handle();
    let assembler = SiteAssembler::new(sites, config.jitter);

    let caller = CallerBuilder::default()
        .reference(reference)
        .contigs(contigs)
        .sink(sink)
        .assemblers(vec![assembler; config.threads])
        .regions(config.regions)
        .region_padding(0)
        .window_length(600)
        .pct_overlap(50)
        .max_indel_length(500)
        .skip_truncated(config.skip_truncated)
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;
    caller.call()?;

    let records = records.lock().unwrap().clone();
    Ok(records)
}
