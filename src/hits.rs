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

//! Index of alignment hits from read identifier to target identifiers.
//!
//! Consumes the plain text lines of mapped alignment records, ie. the output
//! of `samtools view -F 4`, and collects the distinct targets each read
//! aligned against.
//!
//! ## Usage
//!
//! ```rust
//! use distribute_reads::hits::HitIndex;
//!
//! let lines = vec![
//!     "readA\t0\tAmborella-5968\t1\t60\t10M\t*\t0\t0\tACGTACGTAC\tIIIIIIIIII",
//!     "readA\t256\tAmborella-5968\t9\t60\t10M\t*\t0\t0\tACGTACGTAC\tIIIIIIIIII",
//!     "readA\t0\tArabidopsis-6128\t1\t60\t10M\t*\t0\t0\tACGTACGTAC\tIIIIIIIIII",
//! ];
//!
//! let index = HitIndex::from_lines(lines.into_iter()).unwrap();
//!
//! let targets: Vec<&str> = index.get("readA").unwrap().iter().map(|x| x.as_str()).collect();
//! assert_eq!(targets, vec!["5968", "6128"]);
//! ```
//!
use std::io::BufRead;

use indexmap::IndexMap;
use indexmap::IndexSet;
use noodles_sam::alignment::record::Flags;

use crate::reads::strip_mate_suffix;

type E = Box<dyn std::error::Error>;

/// Separator between the sample/species part and the target part of a
/// reference sequence name.
pub const TARGET_SEPARATOR: char = '-';

#[derive(Debug, Clone)]
pub struct MalformedRecordError {
    /// Line in the alignment input, if the record came from there.
    pub line_number: Option<usize>,
    pub reason: String,
}

impl std::fmt::Display for MalformedRecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.line_number {
            Some(line_number) => write!(f, "malformed record on line {}: {}", line_number, self.reason),
            None => write!(f, "malformed record: {}", self.reason),
        }
    }
}

impl std::error::Error for MalformedRecordError {}

#[derive(Debug, Clone)]
pub struct InvalidTargetError {
    pub target: String,
}

impl std::fmt::Display for InvalidTargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "target identifier {:?} can not be used as a directory name", self.target)
    }
}

impl std::error::Error for InvalidTargetError {}

/// Extract the target identifier from a reference sequence name.
///
/// The target identifier is the part after the last `-` in `reference`, or
/// all of `reference` if it has no separator. The result is used as a
/// directory name, so anything that is not a single plain path segment is
/// rejected with [InvalidTargetError].
///
pub fn target_from_reference(
    reference: &str,
) -> Result<String, E> {
    let target = reference.rsplit(TARGET_SEPARATOR).next().unwrap_or(reference);

    let unsafe_char = target.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if target.is_empty() || target == "." || target == ".." || unsafe_char {
        return Err(Box::new(InvalidTargetError{ target: target.to_string() }))
    }

    Ok(target.to_string())
}

/// Mapping from read identifier to the distinct targets it hit.
///
/// Both the reads and the targets of each read keep their insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HitIndex {
    hits: IndexMap<String, IndexSet<String>>,
}

impl HitIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from an iterator over alignment lines.
    ///
    /// Read identifiers are used verbatim. Use [HitIndexBuilder] to strip
    /// mate suffixes from them.
    pub fn from_lines<I, S>(
        lines: I,
    ) -> Result<Self, E> where I: Iterator<Item=S>, S: AsRef<str> {
        let mut builder = HitIndexBuilder::new();
        for line in lines {
            builder.push_line(line.as_ref())?;
        }
        Ok(builder.build())
    }

    /// Build an index from plain text alignment lines in `conn`.
    pub fn from_read<R: BufRead>(
        conn: R,
    ) -> Result<Self, E> {
        HitIndexBuilder::new().read_all(conn)
    }

    /// Record a hit of `read_id` against `target`.
    ///
    /// Returns false if the pair was already present.
    pub fn insert(
        &mut self,
        read_id: &str,
        target: &str,
    ) -> bool {
        if let Some(targets) = self.hits.get_mut(read_id) {
            targets.insert(target.to_string())
        } else {
            let mut targets = IndexSet::new();
            targets.insert(target.to_string());
            self.hits.insert(read_id.to_string(), targets);
            true
        }
    }

    pub fn get(
        &self,
        read_id: &str,
    ) -> Option<&IndexSet<String>> {
        self.hits.get(read_id)
    }

    pub fn contains(
        &self,
        read_id: &str,
    ) -> bool {
        self.hits.contains_key(read_id)
    }

    /// Number of reads with at least one hit.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Distinct targets across all reads in first-seen order.
    pub fn targets(&self) -> IndexSet<&str> {
        self.iter().flat_map(|(_, targets)| targets.iter().map(|x| x.as_str())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item=(&String, &IndexSet<String>)> {
        self.hits.iter()
    }
}

/// Incremental builder for [HitIndex].
#[derive(Clone, Debug, Default)]
pub struct HitIndexBuilder {
    index: HitIndex,
    strip_mate_suffix: bool,
    line_number: usize,
    skipped: usize,
}

impl HitIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize read identifiers the same way as raw read headers.
    pub fn strip_mate_suffix(
        mut self,
        strip: bool,
    ) -> Self {
        self.strip_mate_suffix = strip;
        self
    }

    /// Parse one alignment line and add it to the index.
    ///
    /// Header lines (`@...`), empty lines and records with the unmapped flag
    /// are skipped. Records with fewer than three columns fail with
    /// [MalformedRecordError].
    ///
    pub fn push_line(
        &mut self,
        line: &str,
    ) -> Result<(), E> {
        self.line_number += 1;
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() || line.starts_with('@') {
            self.skipped += 1;
            return Ok(())
        }

        let mut fields = line.split_whitespace();
        let (read_id, flag, reference) = match (fields.next(), fields.next(), fields.next()) {
            (Some(read_id), Some(flag), Some(reference)) => (read_id, flag, reference),
            _ => {
                return Err(Box::new(MalformedRecordError{
                    line_number: Some(self.line_number),
                    reason: format!("expected at least 3 columns in {:?}", line),
                }))
            },
        };

        if let Ok(bits) = flag.parse::<u16>() {
            if Flags::from(bits).is_unmapped() {
                self.skipped += 1;
                return Ok(())
            }
        }

        let read_id = if self.strip_mate_suffix { strip_mate_suffix(read_id) } else { read_id };
        let target = target_from_reference(reference)?;
        self.index.insert(read_id, &target);

        Ok(())
    }

    /// Consume every line in `conn` and return the finished index.
    pub fn read_all<R: BufRead>(
        mut self,
        conn: R,
    ) -> Result<HitIndex, E> {
        for line in conn.lines() {
            self.push_line(&line?)?;
        }
        Ok(self.build())
    }

    pub fn build(self) -> HitIndex {
        log::debug!("Parsed {} alignment lines, skipped {}", self.line_number, self.skipped);
        self.index
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn target_from_reference_takes_last_segment() {
        use super::target_from_reference;

        assert_eq!(target_from_reference("Amborella-trichopoda-6128").unwrap(), "6128");
        assert_eq!(target_from_reference("gene001").unwrap(), "gene001");
    }

    #[test]
    fn target_from_reference_rejects_path_segments() {
        use super::target_from_reference;
        use super::InvalidTargetError;

        for name in ["Species-", "Species-..", "Species-.", "Species-a/b", "Species-a\\b"] {
            let got = target_from_reference(name);
            assert!(got.unwrap_err().downcast_ref::<InvalidTargetError>().is_some(), "{}", name);
        }
    }

    #[test]
    fn from_lines_deduplicates_targets() {
        use super::HitIndex;

        let lines = vec![
            "readA\t0\ttarget-5968",
            "readA\t0\ttarget-5968",
            "readA\t0\ttarget-6128",
        ];
        let got = HitIndex::from_lines(lines.into_iter()).unwrap();

        let mut expected = HitIndex::new();
        expected.insert("readA", "5968");
        expected.insert("readA", "6128");

        assert_eq!(got, expected);
        assert_eq!(got.len(), 1);
        assert_eq!(got.get("readA").unwrap().len(), 2);
    }

    #[test]
    fn from_read_skips_header_and_unmapped() {
        use super::HitIndex;
        use std::io::Cursor;

        let data: Vec<u8> = b"@HD\tVN:1.6\n@SQ\tSN:Amborella-5968\tLN:300\nreadA\t0\tAmborella-5968\t1\t60\t4M\t*\t0\t0\tACGT\tIIII\nreadB\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n\nreadC\t16\tAmborella-5968\t7\t60\t4M\t*\t0\t0\tACGT\tIIII\n".to_vec();

        let got = HitIndex::from_read(Cursor::new(data)).unwrap();

        assert_eq!(got.len(), 2);
        assert!(got.contains("readA"));
        assert!(!got.contains("readB"));
        assert!(got.contains("readC"));
        assert_eq!(got.targets().into_iter().collect::<Vec<&str>>(), vec!["5968"]);
    }

    #[test]
    fn short_line_is_malformed() {
        use super::HitIndex;
        use super::MalformedRecordError;

        let lines = vec!["readA\t0\ttarget-5968", "readB\t0"];
        let got = HitIndex::from_lines(lines.into_iter()).unwrap_err();

        let err = got.downcast_ref::<MalformedRecordError>().unwrap();
        assert_eq!(err.line_number, Some(2));
    }

    #[test]
    fn builder_strips_mate_suffix_when_asked() {
        use super::HitIndexBuilder;

        let mut verbatim = HitIndexBuilder::new();
        verbatim.push_line("readA/1\t0\ttarget-7").unwrap();
        assert!(verbatim.build().contains("readA/1"));

        let mut stripped = HitIndexBuilder::new().strip_mate_suffix(true);
        stripped.push_line("readA/1\t0\ttarget-7").unwrap();
        stripped.push_line("readA/2\t0\ttarget-8").unwrap();
        let index = stripped.build();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("readA").unwrap().len(), 2);
    }

    #[test]
    fn targets_lists_distinct_targets_in_order() {
        use super::HitIndex;

        let mut index = HitIndex::new();
        assert!(index.insert("readA", "5968"));
        assert!(index.insert("readC", "5968"));
        assert!(index.insert("readC", "6128"));
        assert!(!index.insert("readC", "6128"));

        assert_eq!(index.targets().into_iter().collect::<Vec<&str>>(), vec!["5968", "6128"]);
    }
}
