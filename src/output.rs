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

//! Per-target output files.
//!
//! Every target gets its own directory under the output root, holding one
//! file per [StreamKind]:
//!
//! ```text
//! {root}/{target}/{target}_unpaired.fasta
//! {root}/{target}/{target}_interleaved.fasta
//! {root}/{target}/{target}_interleaved.fastq
//! {root}/{target}/{target}_1.fasta
//! {root}/{target}/{target}_2.fasta
//! ```
//!
//! Files are opened in append mode and never truncated. Running twice
//! against the same output root writes every record twice.
//!
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use crate::hits::MalformedRecordError;
use crate::reads::ReadRecord;

type E = Box<dyn std::error::Error>;

/// Default limit on simultaneously open output files.
pub const DEFAULT_MAX_OPEN: usize = 512;

/// The kind of file a record is written to inside a target directory.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum StreamKind {
    Unpaired,
    InterleavedFasta,
    InterleavedFastq,
    Mate1,
    Mate2,
}

impl StreamKind {
    /// File name for `target`.
    pub fn file_name(
        &self,
        target: &str,
    ) -> String {
        match self {
            StreamKind::Unpaired => format!("{}_unpaired.fasta", target),
            StreamKind::InterleavedFasta => format!("{}_interleaved.fasta", target),
            StreamKind::InterleavedFastq => format!("{}_interleaved.fastq", target),
            StreamKind::Mate1 => format!("{}_1.fasta", target),
            StreamKind::Mate2 => format!("{}_2.fasta", target),
        }
    }
}

/// Write `record` in fasta format.
pub fn write_fasta<W: Write>(
    record: &ReadRecord,
    conn: &mut W,
) -> Result<(), E> {
    conn.write_all(b">")?;
    conn.write_all(record.id.as_bytes())?;
    conn.write_all(b"\n")?;
    conn.write_all(&record.seq)?;
    conn.write_all(b"\n")?;
    Ok(())
}

/// Write `record` in fastq format.
///
/// Terminates with a [MalformedRecordError] if `record` has no quality
/// string.
///
pub fn write_fastq<W: Write>(
    record: &ReadRecord,
    conn: &mut W,
) -> Result<(), E> {
    let qual = match record.qual.as_ref() {
        Some(qual) => qual,
        None => return Err(Box::new(MalformedRecordError{
            line_number: None,
            reason: format!("read {} has no quality scores for fastq output", record.id),
        })),
    };
    conn.write_all(b"@")?;
    conn.write_all(record.id.as_bytes())?;
    conn.write_all(b"\n")?;
    conn.write_all(&record.seq)?;
    conn.write_all(b"\n+\n")?;
    conn.write_all(qual)?;
    conn.write_all(b"\n")?;
    Ok(())
}

/// Owns the buffered writers of all per-target output files.
///
/// Writers are opened lazily on first use. If opening a new file would
/// exceed `max_open` writers, all open writers are flushed and closed first.
/// Call [finish](OutputRegistry::finish) to flush and observe write errors;
/// dropping the registry flushes on a best-effort basis.
///
pub struct OutputRegistry {
    root: PathBuf,
    max_open: usize,
    writers: HashMap<(String, StreamKind), BufWriter<File>>,
    files: HashMap<(String, StreamKind), PathBuf>,
}

impl OutputRegistry {
    pub fn new<P: AsRef<Path>>(
        root: P,
    ) -> Self {
        Self::with_max_open(root, DEFAULT_MAX_OPEN)
    }

    pub fn with_max_open<P: AsRef<Path>>(
        root: P,
        max_open: usize,
    ) -> Self {
        OutputRegistry{
            root: root.as_ref().to_path_buf(),
            max_open: max_open.max(1),
            writers: HashMap::new(),
            files: HashMap::new(),
        }
    }

    /// Path of the file for `target` and `kind`.
    pub fn path(
        &self,
        target: &str,
        kind: StreamKind,
    ) -> PathBuf {
        self.root.join(target).join(kind.file_name(target))
    }

    /// Get the writer for `target` and `kind`, creating it if needed.
    pub fn writer(
        &mut self,
        target: &str,
        kind: StreamKind,
    ) -> Result<&mut BufWriter<File>, E> {
        let key = (target.to_string(), kind);
        if !self.writers.contains_key(&key) && self.writers.len() >= self.max_open {
            log::debug!("Closing {} output files", self.writers.len());
            self.flush_and_close()?;
        }

        let path = self.path(target, kind);
        match self.writers.entry(key) {
            Entry::Occupied(conn) => Ok(conn.into_mut()),
            Entry::Vacant(slot) => {
                std::fs::create_dir_all(self.root.join(target))?;
                let f = OpenOptions::new().create(true).append(true).open(&path)?;
                self.files.entry(slot.key().clone()).or_insert(path);
                Ok(slot.insert(BufWriter::new(f)))
            },
        }
    }

    /// Append `record` in fasta format to the `kind` file of `target`.
    pub fn append_fasta(
        &mut self,
        target: &str,
        kind: StreamKind,
        record: &ReadRecord,
    ) -> Result<(), E> {
        let conn = self.writer(target, kind)?;
        write_fasta(record, conn)
    }

    /// Append `record` in fastq format to the `kind` file of `target`.
    pub fn append_fastq(
        &mut self,
        target: &str,
        kind: StreamKind,
        record: &ReadRecord,
    ) -> Result<(), E> {
        let conn = self.writer(target, kind)?;
        write_fastq(record, conn)
    }

    /// Number of currently open writers.
    pub fn n_open(&self) -> usize {
        self.writers.len()
    }

    /// Every file written to during this run.
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = self.files.values().map(|x| x.as_path()).collect();
        files.sort();
        files
    }

    fn flush_and_close(&mut self) -> Result<(), E> {
        for (_, mut conn) in self.writers.drain() {
            conn.flush()?;
        }
        Ok(())
    }

    /// Flush and close all open files.
    pub fn finish(mut self) -> Result<(), E> {
        self.flush_and_close()
    }
}

impl Drop for OutputRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.flush_and_close() {
            log::error!("Failed to flush output files: {}", e);
        }
    }
}

// Tests
#[cfg(test)]
mod tests {
    use crate::reads::ReadRecord;

    fn record(id: &str, seq: &str, qual: Option<&str>) -> ReadRecord {
        ReadRecord{ id: id.to_string(), seq: seq.as_bytes().to_vec(), qual: qual.map(|x| x.as_bytes().to_vec()) }
    }

    #[test]
    fn file_names() {
        use super::StreamKind;

        assert_eq!(StreamKind::Unpaired.file_name("5968"), "5968_unpaired.fasta");
        assert_eq!(StreamKind::InterleavedFasta.file_name("5968"), "5968_interleaved.fasta");
        assert_eq!(StreamKind::InterleavedFastq.file_name("5968"), "5968_interleaved.fastq");
        assert_eq!(StreamKind::Mate1.file_name("5968"), "5968_1.fasta");
        assert_eq!(StreamKind::Mate2.file_name("5968"), "5968_2.fasta");
    }

    #[test]
    fn write_fasta_record() {
        use super::write_fasta;

        let mut got: Vec<u8> = Vec::new();
        write_fasta(&record("readA", "ACGT", Some("IIII")), &mut got).unwrap();

        assert_eq!(got, b">readA\nACGT\n".to_vec());
    }

    #[test]
    fn write_fastq_record() {
        use super::write_fastq;

        let mut got: Vec<u8> = Vec::new();
        write_fastq(&record("readA", "ACGT", Some("IIJJ")), &mut got).unwrap();

        assert_eq!(got, b"@readA\nACGT\n+\nIIJJ\n".to_vec());
    }

    #[test]
    fn write_fastq_without_quality() {
        use super::write_fastq;
        use crate::hits::MalformedRecordError;

        let mut got: Vec<u8> = Vec::new();
        let err = write_fastq(&record("readA", "ACGT", None), &mut got).unwrap_err();

        assert!(err.downcast_ref::<MalformedRecordError>().is_some());
        assert!(got.is_empty());
    }

    #[test]
    fn registry_creates_directories_and_appends() {
        use super::OutputRegistry;
        use super::StreamKind;

        let tmp = tempfile::tempdir().unwrap();

        let mut out = OutputRegistry::new(tmp.path());
        out.append_fasta("5968", StreamKind::Unpaired, &record("readA", "ACGT", None)).unwrap();
        out.append_fasta("5968", StreamKind::Unpaired, &record("readC", "GGGG", None)).unwrap();
        out.finish().unwrap();

        let mut out = OutputRegistry::new(tmp.path());
        out.append_fasta("5968", StreamKind::Unpaired, &record("readD", "TT", None)).unwrap();
        out.finish().unwrap();

        let got = std::fs::read_to_string(tmp.path().join("5968").join("5968_unpaired.fasta")).unwrap();
        assert_eq!(got, ">readA\nACGT\n>readC\nGGGG\n>readD\nTT\n");
    }

    #[test]
    fn registry_respects_max_open() {
        use super::OutputRegistry;
        use super::StreamKind;

        let tmp = tempfile::tempdir().unwrap();

        let mut out = OutputRegistry::with_max_open(tmp.path(), 2);
        for (i, target) in ["1", "2", "3", "1"].iter().enumerate() {
            out.append_fasta(target, StreamKind::Unpaired, &record(&format!("r{}", i), "A", None)).unwrap();
            assert!(out.n_open() <= 2);
        }
        assert_eq!(out.files().len(), 3);
        out.finish().unwrap();

        let got = std::fs::read_to_string(tmp.path().join("1").join("1_unpaired.fasta")).unwrap();
        assert_eq!(got, ">r0\nA\n>r3\nA\n");
    }

    #[test]
    fn registry_fails_if_target_is_a_file() {
        use super::OutputRegistry;
        use super::StreamKind;

        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("7"), b"not a directory").unwrap();

        let mut out = OutputRegistry::new(tmp.path());
        assert!(out.append_fasta("7", StreamKind::Unpaired, &record("readX", "A", None)).is_err());
    }
}
