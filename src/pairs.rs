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

//! Lock-step iteration over the two files of a paired-end library.
//!
//! The Nth record of the first source is paired with the Nth record of the
//! second source. Identifiers are not compared, so the inputs must be in
//! matching order.
//!
use crate::reads::ReadRecord;

type E = Box<dyn std::error::Error>;

/// Which member of a read pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mate {
    First,
    Second,
}

impl std::fmt::Display for Mate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Mate::First => write!(f, "read 1"),
            Mate::Second => write!(f, "read 2"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnevenStreamsError {
    /// The source that ran out first.
    pub exhausted: Mate,
    /// Complete pairs read before running out.
    pub n_pairs: usize,
}

impl std::fmt::Display for UnevenStreamsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} input ended after {} records but its mate input has more", self.exhausted, self.n_pairs)
    }
}

impl std::error::Error for UnevenStreamsError {}

/// Zips two record iterators, failing if one ends before the other.
///
/// Errors from either source are passed through. The iterator is fused after
/// the first error.
///
pub struct PairedReads<A, B> where A: Iterator<Item=Result<ReadRecord, E>>, B: Iterator<Item=Result<ReadRecord, E>> {
    first: A,
    second: B,
    n_pairs: usize,
    done: bool,
}

impl<A, B> PairedReads<A, B> where A: Iterator<Item=Result<ReadRecord, E>>, B: Iterator<Item=Result<ReadRecord, E>> {
    pub fn new(
        first: A,
        second: B,
    ) -> Self {
        PairedReads{ first, second, n_pairs: 0, done: false }
    }

    /// Number of complete pairs returned so far.
    pub fn n_pairs(&self) -> usize {
        self.n_pairs
    }

    fn fail(
        &mut self,
        err: E,
    ) -> Option<Result<(ReadRecord, ReadRecord), E>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<A, B> Iterator for PairedReads<A, B> where A: Iterator<Item=Result<ReadRecord, E>>, B: Iterator<Item=Result<ReadRecord, E>> {
    type Item = Result<(ReadRecord, ReadRecord), E>;

    fn next(
        &mut self,
    ) -> Option<Result<(ReadRecord, ReadRecord), E>> {
        if self.done {
            return None
        }

        match (self.first.next(), self.second.next()) {
            (None, None) => {
                self.done = true;
                None
            },
            (Some(Err(e)), _) | (_, Some(Err(e))) => self.fail(e),
            (Some(Ok(read_1)), Some(Ok(read_2))) => {
                self.n_pairs += 1;
                Some(Ok((read_1, read_2)))
            },
            (None, Some(Ok(_))) => {
                let n_pairs = self.n_pairs;
                self.fail(Box::new(UnevenStreamsError{ exhausted: Mate::First, n_pairs }))
            },
            (Some(Ok(_)), None) => {
                let n_pairs = self.n_pairs;
                self.fail(Box::new(UnevenStreamsError{ exhausted: Mate::Second, n_pairs }))
            },
        }
    }
}
