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

//! distribute-reads is a library and a command-line client for sorting
//! sequencing reads by the bait targets they aligned to.
//!
//! After the raw reads of a target enrichment experiment have been aligned
//! against the target sequences, each target needs its own set of reads for
//! assembly. distribute-reads:
//!
//!   - Reads the mapped records of the alignment (through `samtools view -F 4`
//!     or from plain text SAM) into a [HitIndex](hits::HitIndex).
//!   - Streams the raw single-end or paired-end reads once.
//!   - Appends every read or read pair that hit a target into fasta (and
//!     optionally interleaved fastq) files in a directory named after the
//!     target.
//!
//! Target identifiers are the part of the reference sequence name after the
//! last `-`, eg. reads aligning to `Amborella-6128` go to `6128/`.
//!
//! ## Usage
//!
//! ### Command line
//!
//! ```text
//! distribute-reads [OPTIONS] <ALIGNMENT> <READS>...
//! ```
//!
//! Give one read file for single-end data or two for paired-end data. Paired
//! files are read in lock-step: the Nth record of the first file is the mate
//! of the Nth record of the second file.
//!
//! Output files are opened in append mode. Clear the output directory before
//! rerunning, or every record is written again.
//!
//! ### Rust API
//!
//! The components can be used separately:
//!
//!   - [HitIndex](hits::HitIndex): read identifier to target identifiers.
//!   - [ReadSource](reads::ReadSource): iterator over fasta/fastq records.
//!   - [PairedReads](pairs::PairedReads): lock-step iterator over two sources.
//!   - [OutputRegistry](output::OutputRegistry): per-target output files.
//!   - [Distributor](distribute::Distributor): writes reads to their targets.
//!
//! ```rust
//! use distribute_reads::hits::HitIndex;
//! use distribute_reads::distribute::{DistributeOptions, Distributor};
//! use distribute_reads::output::OutputRegistry;
//! use distribute_reads::reads::ReadSource;
//! use std::io::Cursor;
//!
//! let sam: Vec<u8> = b"readX\t0\tAmborella-7\t1\t60\t4M\t*\t0\t0\tACGT\tIIII\n".to_vec();
//! let index = HitIndex::from_read(Cursor::new(sam)).unwrap();
//!
//! let reads_1 = ReadSource::from_read(Cursor::new(b"@readX/1\nACGT\n+\nIIII\n".to_vec())).unwrap();
//! let reads_2 = ReadSource::from_read(Cursor::new(b"@readX/2\nTTGA\n+\nJJJJ\n".to_vec())).unwrap();
//!
//! # let tmp = tempfile::tempdir().unwrap();
//! let root = tmp.path().join("out");
//!
//! let mut out = OutputRegistry::new(&root);
//! let distributor = Distributor::new(&index, DistributeOptions::default());
//! distributor.distribute_paired(reads_1, reads_2, &mut out).unwrap();
//! out.finish().unwrap();
//!
//! let got = std::fs::read_to_string(root.join("7").join("7_interleaved.fasta")).unwrap();
//! assert_eq!(got, ">readX\nACGT\n>readX\nTTGA\n");
//! ```
//!

use std::path::Path;
use std::path::PathBuf;

use distribute::DistributeOptions;
use distribute::DistributionStats;
use distribute::Distributor;
use hits::HitIndex;
use hits::HitIndexBuilder;
use output::OutputRegistry;
use reads::ReadSource;

pub mod distribute;
pub mod filter;
pub mod hits;
pub mod output;
pub mod pairs;
pub mod reads;

type E = Box<dyn std::error::Error>;

/// File layout for paired-end output.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputLayout {
    /// `{target}_interleaved.fasta`, plus `{target}_interleaved.fastq` if merged.
    #[default]
    Interleaved,
    /// `{target}_1.fasta` and `{target}_2.fasta`.
    Split,
}

impl std::str::FromStr for OutputLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interleaved" => Ok(OutputLayout::Interleaved),
            "split" => Ok(OutputLayout::Split),
            _ => Err(format!("'{}' is not a valid OutputLayout", s)),
        }
    }
}

/// Which mate decides the targets of a read pair.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PairPolicy {
    /// Targets of read 1 if it has any, otherwise those of read 2.
    #[default]
    PreferFirstMate,
    /// Targets of both reads.
    UnionOfBothMates,
}

impl std::str::FromStr for PairPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-mate" => Ok(PairPolicy::PreferFirstMate),
            "union" => Ok(PairPolicy::UnionOfBothMates),
            _ => Err(format!("'{}' is not a valid PairPolicy", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadFileCountError {
    pub n_files: usize,
}

impl std::fmt::Display for ReadFileCountError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "expected 1 (single-end) or 2 (paired-end) read files, got {}", self.n_files)
    }
}

impl std::error::Error for ReadFileCountError {}

/// Where the alignment records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentInput {
    /// Filter a binary alignment file with this samtools executable.
    Samtools(String),
    /// Read plain text SAM, `-` for stdin.
    Sam,
}

impl Default for AlignmentInput {
    fn default() -> Self {
        AlignmentInput::Samtools(filter::SAMTOOLS.to_string())
    }
}

/// Everything needed for a complete run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub alignment: PathBuf,
    pub alignment_input: AlignmentInput,
    pub read_files: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub distribute: DistributeOptions,
    /// Strip `/1` and `/2` from alignment read identifiers.
    pub strip_hit_suffix: bool,
    pub max_open: usize,
}

/// Build the [HitIndex] for `alignment`.
pub fn build_index<P: AsRef<Path>>(
    alignment: P,
    input: &AlignmentInput,
    strip_hit_suffix: bool,
) -> Result<HitIndex, E> {
    let builder = HitIndexBuilder::new().strip_mate_suffix(strip_hit_suffix);
    match input {
        AlignmentInput::Samtools(samtools) => filter::mapped_records(alignment, samtools, builder),
        AlignmentInput::Sam => filter::sam_records(alignment, builder),
    }
}

/// Distribute the reads in `read_files` to the targets in `index`.
///
/// One file is treated as single-end and two files as paired-end data.
/// Terminates with a [ReadFileCountError] for any other number of files.
///
pub fn distribute_files<P: AsRef<Path>>(
    index: &HitIndex,
    read_files: &[P],
    out: &mut OutputRegistry,
    options: DistributeOptions,
) -> Result<DistributionStats, E> {
    let distributor = Distributor::new(index, options);
    match read_files {
        [reads] => {
            log::info!("Distributing single-end reads from {}", reads.as_ref().display());
            let reads = ReadSource::from_path(reads)?;
            distributor.distribute_single(reads, out)
        },
        [reads_1, reads_2] => {
            log::info!("Distributing paired-end reads from {} and {}", reads_1.as_ref().display(), reads_2.as_ref().display());
            let reads_1 = ReadSource::from_path(reads_1)?;
            let reads_2 = ReadSource::from_path(reads_2)?;
            distributor.distribute_paired(reads_1, reads_2, out)
        },
        _ => Err(Box::new(ReadFileCountError{ n_files: read_files.len() })),
    }
}

/// Build the hit index and distribute all reads according to `opts`.
pub fn run(
    opts: &RunOptions,
) -> Result<DistributionStats, E> {
    if opts.read_files.is_empty() || opts.read_files.len() > 2 {
        return Err(Box::new(ReadFileCountError{ n_files: opts.read_files.len() }))
    }

    let index = build_index(&opts.alignment, &opts.alignment_input, opts.strip_hit_suffix)?;
    log::info!("Unique reads with hits: {}", index.len());
    log::debug!("Targets with hits: {}", index.targets().len());

    let max_open = if opts.max_open == 0 { output::DEFAULT_MAX_OPEN } else { opts.max_open };
    let mut out = OutputRegistry::with_max_open(&opts.out_dir, max_open);
    let stats = distribute_files(&index, &opts.read_files, &mut out, opts.distribute.clone())?;
    out.finish()?;

    Ok(stats)
}
