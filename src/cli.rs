// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

use crate::assembly::pileup::{PileupAssembler, PileupParams};
use crate::calling::CallerBuilder;
use crate::errors::Error;
use crate::genome::ContigTable;
use crate::reference::{Buffer, ReferenceRead};
use crate::utils;
use crate::variants::vcf::{self, VcfWriter};
use crate::windows::WindowBuilder;

pub const MIN_THREAD_COUNT: usize = 1;

/// Number of whole contigs kept in the reference buffer.
const REFERENCE_LRU_CAPACITY: usize = 4;

#[derive(Debug, StructOpt, Serialize, Deserialize, Clone)]
#[structopt(
    name = "trephine",
    about = "A somatic SNV and indel caller for tumor-normal pairs, driven by windowed local reassembly.",
    setting = structopt::clap::AppSettings::ColoredHelp,
)]
pub struct CliParams {
    #[structopt(
        long,
        parse(from_os_str),
        help = "FASTA file with reference genome. Has to be indexed with samtools faidx."
    )]
    pub reference: PathBuf,
    #[structopt(
        long,
        parse(from_os_str),
        help = "BAM/CRAM file with reads from the tumor sample."
    )]
    pub tumor: PathBuf,
    #[structopt(
        long,
        parse(from_os_str),
        help = "BAM/CRAM file with reads from the matched normal sample."
    )]
    pub normal: PathBuf,
    #[structopt(
        long = "region",
        help = "Samtools-style region string CONTIG[:START[-END]] to process (can be given multiple times)."
    )]
    pub regions: Vec<String>,
    #[structopt(
        long = "bed",
        parse(from_os_str),
        help = "BED file (3 columns) with regions to process."
    )]
    pub bed_path: Option<PathBuf>,
    #[structopt(
        long = "padding",
        default_value = "250",
        help = "Symmetric padding in bases added to each input region before tiling."
    )]
    pub region_padding: u32,
    #[structopt(long, default_value = "600", help = "Window length in bases.")]
    pub window_length: u32,
    #[structopt(
        long,
        default_value = "50",
        help = "Percent overlap between successive windows (0-99)."
    )]
    pub pct_overlap: u32,
    #[structopt(
        long,
        default_value = "500",
        help = "Maximum indel length to call; also sizes the ordered-flush look-ahead."
    )]
    pub max_indel_length: u32,
    #[structopt(
        long = "threads",
        default_value = "1",
        help = "Number of assembler worker threads."
    )]
    pub num_threads: usize,
    #[structopt(
        long = "skip-truncated",
        help = "Drop windows whose reference sequence is truncated in the fasta instead of aborting."
    )]
    pub skip_truncated: bool,
    #[structopt(long = "output", parse(from_os_str), help = "Output VCF path.")]
    pub out_vcf: PathBuf,
    #[structopt(
        long = "out-graphs-dir",
        parse(from_os_str),
        help = "Optional directory for debug dumps (effective parameters etc.)."
    )]
    pub out_graphs_dir: Option<PathBuf>,
    #[structopt(long, default_value = "20", help = "Minimum mapping quality of reads to use.")]
    pub min_mapq: u8,
    #[structopt(long, default_value = "13", help = "Minimum base quality of observations to use.")]
    pub min_base_qual: u8,
    #[structopt(
        long,
        default_value = "3",
        help = "Minimum alt-supporting tumor reads for a candidate."
    )]
    pub min_tumor_support: u32,
    #[structopt(
        long,
        default_value = "1",
        help = "Maximum alt-supporting normal reads for a somatic candidate."
    )]
    pub max_normal_support: u32,
    #[structopt(
        short = "v",
        long = "verbose",
        parse(from_occurrences),
        help = "Verbosity (-v: debug, -vv: trace)."
    )]
    pub verbose: u8,
}

impl CliParams {
    pub fn validate(&self) -> Result<(), Error> {
        if self.pct_overlap >= 100 {
            return Err(Error::InvalidOverlap {
                pct: self.pct_overlap,
            });
        }
        if WindowBuilder::step_size(self.pct_overlap, self.window_length) < 1 {
            return Err(Error::InvalidStepSize {
                window_length: self.window_length,
                pct_overlap: self.pct_overlap,
            });
        }
        if self.num_threads < MIN_THREAD_COUNT {
            return Err(Error::InvalidThreadCount {
                count: self.num_threads,
            });
        }
        Ok(())
    }
}

pub fn run(params: CliParams) -> Result<()> {
    params.validate()?;
    info!("successfully validated input command line parameters");

    if let Some(ref dir) = params.out_graphs_dir {
        utils::make_dir(dir)?;
        fs::write(
            dir.join("params.json"),
            serde_json::to_string_pretty(&params)?,
        )?;
    }

    let reference = Buffer::from_path(&params.reference, REFERENCE_LRU_CAPACITY)?;
    let contigs = ContigTable::new(&reference.contigs());

    let normal_sample = utils::bam_sample_name(&params.normal)?;
    let tumor_sample = utils::bam_sample_name(&params.tumor)?;
    let header = vcf::header(&contigs, &normal_sample, &tumor_sample);
    let sink = VcfWriter::from_path(&params.out_vcf, &header)?;

    let pileup_params = PileupParams {
        min_mapq: params.min_mapq,
        min_base_qual: params.min_base_qual,
        min_tumor_support: params.min_tumor_support,
        max_normal_support: params.max_normal_support,
        max_indel_length: params.max_indel_length,
    };
    let assemblers = (0..params.num_threads)
        .map(|_| PileupAssembler::from_paths(&params.tumor, &params.normal, pileup_params))
        .collect::<Result<Vec<_>>>()?;

    let caller = CallerBuilder::default()
        .reference(reference)
        .contigs(contigs)
        .sink(sink)
        .assemblers(assemblers)
        .regions(params.regions.clone())
        .bed_path(params.bed_path.clone())
        .region_padding(params.region_padding)
        .window_length(params.window_length)
        .pct_overlap(params.pct_overlap)
        .max_indel_length(params.max_indel_length)
        .skip_truncated(params.skip_truncated)
        .build()
        .map_err(|e| anyhow!(e))?;

    caller.call()
}
