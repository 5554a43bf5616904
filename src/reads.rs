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

//! Streaming access to raw reads in fasta or fastq format.
//!
//! Input can be gzip compressed. Records are read one at a time, the input
//! is never loaded into memory in full.
//!
use std::io::Read;
use std::path::Path;

use bstr::ByteSlice;
use needletail::FastxReader;
use needletail::errors::ParseError;
use needletail::errors::ParseErrorKind;

type E = Box<dyn std::error::Error>;

/// A single read with a normalized identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadRecord {
    /// Identifier with description and mate suffix removed.
    pub id: String,
    pub seq: Vec<u8>,
    /// Quality string, only present for fastq input.
    pub qual: Option<Vec<u8>>,
}

/// Remove a trailing `/1` or `/2` mate suffix from `id`.
pub fn strip_mate_suffix(
    id: &str,
) -> &str {
    id.strip_suffix("/1").or_else(|| id.strip_suffix("/2")).unwrap_or(id)
}

/// Normalize a fasta/fastq header line into a read identifier.
///
/// Keeps the first whitespace-delimited token and strips its mate suffix.
///
/// ```rust
/// use distribute_reads::reads::normalize_id;
///
/// assert_eq!(normalize_id(b"readX/1 1:N:0:ATCACG"), "readX");
/// assert_eq!(normalize_id(b"readX/3"), "readX/3");
/// ```
///
pub fn normalize_id(
    header: &[u8],
) -> String {
    let token = header.fields().next().unwrap_or_default();
    strip_mate_suffix(&token.to_str_lossy()).to_string()
}

/// Iterator over the records of a fasta or fastq file.
///
/// An empty input yields no records.
pub struct ReadSource<'a> {
    reader: Option<Box<dyn FastxReader + 'a>>,
    n_records: usize,
}

/// Treat needletail's empty input error as a source without records.
fn empty_as_none<'a>(
    parsed: Result<Box<dyn FastxReader + 'a>, ParseError>,
) -> Result<Option<Box<dyn FastxReader + 'a>>, E> {
    match parsed {
        Ok(reader) => Ok(Some(reader)),
        Err(e) if matches!(e.kind, ParseErrorKind::EmptyFile) => Ok(None),
        Err(e) => Err(Box::new(e)),
    }
}

impl ReadSource<'static> {
    /// Open a (possibly gzipped) fasta or fastq file.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Self, E> {
        let path = path.as_ref();
        let reader = empty_as_none(needletail::parse_fastx_file(path))?;
        if reader.is_none() {
            log::warn!("{} is empty", path.display());
        }
        Ok(ReadSource{ reader, n_records: 0 })
    }
}

impl<'a> ReadSource<'a> {
    /// Read fasta or fastq records from `conn`.
    pub fn from_read<R: Read + Send + 'a>(
        conn: R,
    ) -> Result<Self, E> {
        let reader = empty_as_none(needletail::parse_fastx_reader(conn))?;
        Ok(ReadSource{ reader, n_records: 0 })
    }

    /// Number of records returned so far.
    pub fn n_records(&self) -> usize {
        self.n_records
    }
}

impl Iterator for ReadSource<'_> {
    type Item = Result<ReadRecord, E>;

    fn next(
        &mut self,
    ) -> Option<Result<ReadRecord, E>> {
        let record = match self.reader.as_mut()?.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(Box::new(e))),
        };
        self.n_records += 1;

        Some(Ok(ReadRecord{
            id: normalize_id(record.id()),
            seq: record.seq().into_owned(),
            qual: record.qual().map(|qual| qual.to_vec()),
        }))
    }
}
