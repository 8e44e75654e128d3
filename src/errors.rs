use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    /* ===================== Input Errors ============================ */
    #[error("invalid samtools region string: {region}")]
    InvalidRegion { region: String },
    #[error("invalid bed line with {columns} columns at line num {line}")]
    InvalidBedLine { line: usize, columns: usize },
    #[error("could not parse bed line {line}: {content}")]
    InvalidBedRecord { line: usize, content: String },
    #[error("contig {contig} is not present in reference")]
    UnknownContig { contig: String },
    #[error("no input regions provided to build windows")]
    NoInputRegions,
    #[error("invalid window overlap: must be within 0..100, got {pct}%")]
    InvalidOverlap { pct: u32 },
    #[error(
        "window length {window_length} with {pct_overlap}% overlap quantizes to a zero step size"
    )]
    InvalidStepSize { window_length: u32, pct_overlap: u32 },
    #[error("invalid thread count: must be at least 1, got {count}")]
    InvalidThreadCount { count: usize },
    /* =============================================================== */
    /* ===================== Reference Errors ======================== */
    #[error(
        "truncated reference sequence for {region}: index claims {expected} bases, fasta holds {actual}"
    )]
    TruncatedSequence {
        region: String,
        expected: u64,
        actual: u64,
    },
    /* =============================================================== */
    /* ===================== Alignment Errors ======================== */
    #[error("no @RG SM entries found in alignment header of {path}")]
    MissingReadGroup { path: PathBuf },
    #[error("expected exactly one sample name in {path}, found {count}")]
    MultiSampleAlignment { path: PathBuf, count: usize },
}
