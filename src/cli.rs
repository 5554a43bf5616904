// distribute-reads: Distribute sequencing reads into per-target files.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//
use std::path::PathBuf;

use clap::Parser;

use distribute_reads::OutputLayout;
use distribute_reads::PairPolicy;

/// Distribute reads into per-target fasta files based on their alignments.
#[derive(Parser)]
#[command(version)]
pub struct Cli {
    // Alignment of the reads against the targets
    #[arg(required = true, help = "BAM file from aligning the reads against the targets")]
    pub alignment: PathBuf,

    // Raw reads, 1 file for single-end or 2 for paired-end
    #[arg(required = true, num_args = 1..=2, help = "Read file(s), 1 for single-end or 2 for paired-end")]
    pub read_files: Vec<PathBuf>,

    // Also write interleaved fastq
    #[arg(long = "merged", default_value_t = false, conflicts_with = "split", help = "Also write interleaved fastq files for read merging")]
    pub merged: bool,

    // Write mates to separate files
    #[arg(long = "split", default_value_t = false, help = "Write paired reads to {target}_1.fasta and {target}_2.fasta")]
    pub split: bool,

    // Which mate decides the targets of a pair
    #[arg(long = "pair-policy", default_value = "first-mate", help = "first-mate or union")]
    pub pair_policy: PairPolicy,

    // Output root
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    pub out_dir: PathBuf,

    // Input is plain text SAM
    #[arg(long = "sam", default_value_t = false, help = "Read the alignment as plain text SAM, '-' for stdin")]
    pub sam: bool,

    // samtools executable
    #[arg(long = "samtools", default_value = "samtools")]
    pub samtools: String,

    // Strip /1 and /2 from alignment read names
    #[arg(long = "strip-hit-suffix", default_value_t = false)]
    pub strip_hit_suffix: bool,

    // Limit on simultaneously open output files
    #[arg(long = "max-open-files", default_value_t = 512)]
    pub max_open: usize,

    // Verbosity
    #[arg(long = "verbose", default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn layout(&self) -> OutputLayout {
        if self.split { OutputLayout::Split } else { OutputLayout::Interleaved }
    }
}
