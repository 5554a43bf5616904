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

//! Distributing reads to the targets they hit.
//!
//! A [Distributor] looks up each read, or read pair, in a [HitIndex] and
//! appends it to the output files of every target it maps to through an
//! [OutputRegistry].
//!
//! ## Usage
//!
//! ```rust
//! use distribute_reads::distribute::{DistributeOptions, Distributor};
//! use distribute_reads::hits::HitIndex;
//! use distribute_reads::output::OutputRegistry;
//! use distribute_reads::reads::ReadSource;
//! use std::io::Cursor;
//!
//! let mut index = HitIndex::new();
//! index.insert("readA", "5968");
//!
//! let reads = ReadSource::from_read(Cursor::new(b">readA\nACGT\n>readB\nTTTT\n".to_vec())).unwrap();
//!
//! # let tmp = tempfile::tempdir().unwrap();
//! let root = tmp.path().join("out");
//!
//! let mut out = OutputRegistry::new(&root);
//! let stats = Distributor::new(&index, DistributeOptions::default()).distribute_single(reads, &mut out).unwrap();
//! out.finish().unwrap();
//!
//! assert_eq!(stats.records, 2);
//! assert_eq!(stats.assigned, 1);
//!
//! let got = std::fs::read_to_string(root.join("5968").join("5968_unpaired.fasta")).unwrap();
//! assert_eq!(got, ">readA\nACGT\n");
//! ```
//!
use indexmap::IndexSet;

use crate::OutputLayout;
use crate::PairPolicy;
use crate::hits::HitIndex;
use crate::output::OutputRegistry;
use crate::output::StreamKind;
use crate::pairs::PairedReads;
use crate::reads::ReadRecord;

type E = Box<dyn std::error::Error>;

/// How read pairs are written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributeOptions {
    pub layout: OutputLayout,
    /// Also write interleaved fastq. Only used with [OutputLayout::Interleaved].
    pub merged: bool,
    pub policy: PairPolicy,
}

/// Counters from a single distribution pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributionStats {
    /// Reads, or read pairs, consumed.
    pub records: usize,
    /// Reads, or read pairs, written to at least one target.
    pub assigned: usize,
    /// Writes of a read or read pair to a target.
    pub writes: usize,
    /// Distinct targets written to.
    pub targets: usize,
}

pub struct Distributor<'a> {
    index: &'a HitIndex,
    options: DistributeOptions,
}

impl<'a> Distributor<'a> {
    pub fn new(
        index: &'a HitIndex,
        options: DistributeOptions,
    ) -> Self {
        Distributor{ index, options }
    }

    /// Targets a pair is written to under the configured [PairPolicy].
    pub fn pair_targets(
        &self,
        id_1: &str,
        id_2: &str,
    ) -> IndexSet<&'a str> {
        let index: &'a HitIndex = self.index;
        let targets_1 = index.get(id_1);
        let targets_2 = index.get(id_2);
        let chosen: Vec<&'a IndexSet<String>> = match self.options.policy {
            PairPolicy::PreferFirstMate => targets_1.or(targets_2).into_iter().collect(),
            PairPolicy::UnionOfBothMates => targets_1.into_iter().chain(targets_2).collect(),
        };
        chosen.into_iter().flat_map(|targets| targets.iter().map(|x| x.as_str())).collect()
    }

    /// Append every single-end read that hit a target to `{target}_unpaired.fasta`.
    pub fn distribute_single<I>(
        &self,
        reads: I,
        out: &mut OutputRegistry,
    ) -> Result<DistributionStats, E> where I: Iterator<Item=Result<ReadRecord, E>> {
        let mut stats = DistributionStats::default();
        let mut seen: IndexSet<&str> = IndexSet::new();

        for record in reads {
            let record = record?;
            stats.records += 1;

            if let Some(targets) = self.index.get(&record.id) {
                stats.assigned += 1;
                for target in targets {
                    out.append_fasta(target, StreamKind::Unpaired, &record)?;
                    seen.insert(target.as_str());
                    stats.writes += 1;
                }
            }
        }

        stats.targets = seen.len();
        log::info!("Distributed {} of {} reads to {} targets", stats.assigned, stats.records, stats.targets);
        Ok(stats)
    }

    /// Append both mates of every read pair that hit a target.
    ///
    /// `reads_1` and `reads_2` are consumed in lock-step. Terminates with an
    /// [UnevenStreamsError](crate::pairs::UnevenStreamsError) if one runs out
    /// before the other; pairs read before that are already written.
    ///
    pub fn distribute_paired<A, B>(
        &self,
        reads_1: A,
        reads_2: B,
        out: &mut OutputRegistry,
    ) -> Result<DistributionStats, E> where A: Iterator<Item=Result<ReadRecord, E>>, B: Iterator<Item=Result<ReadRecord, E>> {
        let mut stats = DistributionStats::default();
        let mut seen: IndexSet<&str> = IndexSet::new();

        for pair in PairedReads::new(reads_1, reads_2) {
            let (read_1, read_2) = pair?;
            stats.records += 1;

            let targets = self.pair_targets(&read_1.id, &read_2.id);
            if targets.is_empty() {
                continue;
            }
            stats.assigned += 1;

            for target in targets {
                self.write_pair(target, &read_1, &read_2, out)?;
                seen.insert(target);
                stats.writes += 1;
            }
        }

        stats.targets = seen.len();
        log::info!("Distributed {} of {} read pairs to {} targets", stats.assigned, stats.records, stats.targets);
        Ok(stats)
    }

    /// Write one read pair to the files of `target`.
    pub fn write_pair(
        &self,
        target: &str,
        read_1: &ReadRecord,
        read_2: &ReadRecord,
        out: &mut OutputRegistry,
    ) -> Result<(), E> {
        match self.options.layout {
            OutputLayout::Interleaved => {
                if self.options.merged {
                    out.append_fastq(target, StreamKind::InterleavedFastq, read_1)?;
                    out.append_fastq(target, StreamKind::InterleavedFastq, read_2)?;
                }
                out.append_fasta(target, StreamKind::InterleavedFasta, read_1)?;
                out.append_fasta(target, StreamKind::InterleavedFasta, read_2)?;
            },
            OutputLayout::Split => {
                out.append_fasta(target, StreamKind::Mate1, read_1)?;
                out.append_fasta(target, StreamKind::Mate2, read_2)?;
            },
        }
        Ok(())
    }
}
