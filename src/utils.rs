// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rust_htslib::bam::{self, Read};

use crate::errors::Error;

/// Extracts the sample name from the `@RG SM` tags of an alignment header.
/// Tumor and normal alignments must each carry exactly one distinct sample
/// name.
pub fn bam_sample_name<P: AsRef<Path>>(path: P) -> Result<String> {
    let reader = bam::Reader::from_path(path.as_ref())
        .context(format!("unable to open alignment {}", path.as_ref().display()))?;
    let header = bam::Header::from_template(reader.header());

    let mut names: Vec<String> = Vec::new();
    for (key, records) in header.to_hashmap() {
        if key != "RG" {
            continue;
        }
        for record in records {
            if let Some(name) = record.get("SM") {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
    }

    match names.len() {
        0 => Err(Error::MissingReadGroup {
            path: path.as_ref().to_owned(),
        }
        .into()),
        1 => Ok(names.pop().unwrap()),
        count => Err(Error::MultiSampleAlignment {
            path: path.as_ref().to_owned(),
            count,
        }
        .into()),
    }
}

pub fn make_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    fs::create_dir_all(path.as_ref()).context(format!(
        "could not create output directory {}",
        path.as_ref().display()
    ))
}
