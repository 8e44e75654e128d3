// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::Path;

use anyhow::{Context, Result};
use rust_htslib::bcf::{self, record::Numeric};

use crate::genome::ContigTable;
use crate::variants::CandidateVariant;

/// Output sink for flushed candidate variants. The pipeline driver is the
/// only writer.
pub trait VariantSink {
    fn write(&mut self, variant: &CandidateVariant) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Builds the output VCF header: reference contigs in table order, the
/// normal and tumor sample columns, and the FORMAT fields carried by the
/// candidate evidence.
pub fn header(contigs: &ContigTable, normal_sample: &str, tumor_sample: &str) -> bcf::Header {
    let mut header = bcf::Header::new();

    for info in contigs.iter() {
        header.push_record(format!("##contig=<ID={},length={}>", info.name, info.length).as_bytes());
    }

    header.push_record(
        b"##INFO=<ID=SOMATIC,Number=0,Type=Flag,Description=\"Somatic candidate variant\">",
    );
    header.push_record(
        b"##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Total read depth over the site\">",
    );
    header.push_record(
        b"##FORMAT=<ID=RD,Number=1,Type=Integer,Description=\"Reads supporting the reference allele\">",
    );
    header.push_record(
        b"##FORMAT=<ID=AD,Number=1,Type=Integer,Description=\"Reads supporting the alternate allele\">",
    );
    header.push_record(
        b"##FORMAT=<ID=ADF,Number=1,Type=Integer,Description=\"Alternate-supporting reads on the forward strand\">",
    );
    header.push_record(
        b"##FORMAT=<ID=ADR,Number=1,Type=Integer,Description=\"Alternate-supporting reads on the reverse strand\">",
    );

    header.push_sample(normal_sample.as_bytes());
    header.push_sample(tumor_sample.as_bytes());

    header
}

/// htslib-backed VCF writer. Sample order is normal, tumor — matching the
/// header built above.
pub struct VcfWriter {
    inner: bcf::Writer,
}

impl VcfWriter {
    pub fn from_path<P: AsRef<Path>>(path: P, header: &bcf::Header) -> Result<Self> {
        let inner = bcf::Writer::from_path(path.as_ref(), header, true, bcf::Format::Vcf)
            .context(format!(
                "unable to create output vcf {}",
                path.as_ref().display()
            ))?;
        Ok(VcfWriter { inner })
    }
}

impl VariantSink for VcfWriter {
    fn write(&mut self, variant: &CandidateVariant) -> Result<()> {
        let rid = self.inner.header().name2rid(variant.contig.as_bytes())?;
        let mut record = self.inner.empty_record();
        record.set_rid(Some(rid));
        record.set_pos(variant.pos);
        record.set_alleles(&[&variant.ref_allele[..], &variant.alt_allele[..]])?;
        record.set_qual(f32::missing());
        record.push_info_flag(b"SOMATIC")?;

        let normal = &variant.evidence.normal;
        let tumor = &variant.evidence.tumor;
        record.push_format_integer(b"DP", &[normal.dp as i32, tumor.dp as i32])?;
        record.push_format_integer(b"RD", &[normal.rd() as i32, tumor.rd() as i32])?;
        record.push_format_integer(b"AD", &[normal.ad() as i32, tumor.ad() as i32])?;
        record.push_format_integer(b"ADF", &[normal.ad_fwd as i32, tumor.ad_fwd as i32])?;
        record.push_format_integer(b"ADR", &[normal.ad_rev as i32, tumor.ad_rev as i32])?;

        self.inner.write(&record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        // htslib buffers internally and flushes when the file handle closes
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // the underlying hts file handle is closed on drop
        Ok(())
    }
}
