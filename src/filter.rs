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

//! Reading mapped alignment records into a [HitIndex].
//!
//! Binary alignment files are filtered through `samtools view -F 4`, which
//! drops unmapped records and prints the rest as SAM text. Plain text SAM can
//! be read directly.
//!
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;

use crate::hits::HitIndex;
use crate::hits::HitIndexBuilder;

type E = Box<dyn std::error::Error>;

/// Default name of the samtools executable.
pub const SAMTOOLS: &str = "samtools";

#[derive(Debug, Clone)]
pub struct ExternalToolError {
    /// The command that was run.
    pub command: String,
    /// What went wrong, including the tool's own diagnostics.
    pub reason: String,
}

impl std::fmt::Display for ExternalToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "`{}` failed: {}", self.command, self.reason)
    }
}

impl std::error::Error for ExternalToolError {}

/// Build a [HitIndex] from the mapped records in a BAM/CRAM/SAM file.
///
/// Runs `<samtools> view -F 4 <alignment>` and parses its output as it is
/// produced. Terminates with an [ExternalToolError] if the tool can not be
/// started or exits with a non-zero status. If parsing its output fails, the
/// tool is stopped and the parse error is returned instead.
///
pub fn mapped_records<P: AsRef<Path>>(
    alignment: P,
    samtools: &str,
    builder: HitIndexBuilder,
) -> Result<HitIndex, E> {
    let alignment = alignment.as_ref();
    let command = format!("{} view -F 4 {}", samtools, alignment.display());
    log::info!("Running `{}`", command);

    let mut child = Command::new(samtools)
        .arg("view")
        .arg("-F")
        .arg("4")
        .arg(alignment)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExternalToolError{ command: command.clone(), reason: e.to_string() })?;

    let stdout = child.stdout.take().ok_or_else(|| ExternalToolError{ command: command.clone(), reason: "stdout was not captured".to_string() })?;
    let mut stderr = child.stderr.take().ok_or_else(|| ExternalToolError{ command: command.clone(), reason: "stderr was not captured".to_string() })?;

    // Drain stderr so the child can not block on a full pipe.
    let stderr_reader = std::thread::spawn(move || {
        let mut diagnostics = String::new();
        let _ = stderr.read_to_string(&mut diagnostics);
        diagnostics
    });

    let index = builder.read_all(BufReader::new(stdout));

    if index.is_err() {
        // The tool may still be writing to the closed pipe.
        let _ = child.kill();
        let _ = child.wait();
        let _ = stderr_reader.join();
        return index
    }

    let status = child.wait()?;
    let diagnostics = stderr_reader.join().unwrap_or_default();

    if !status.success() {
        return Err(Box::new(ExternalToolError{
            command,
            reason: format!("{}: {}", status, diagnostics.trim()),
        }))
    }

    index
}

/// Build a [HitIndex] from a plain text SAM file, or standard input if
/// `alignment` is `-`.
///
/// Unmapped records are skipped based on their flag.
///
pub fn sam_records<P: AsRef<Path>>(
    alignment: P,
    builder: HitIndexBuilder,
) -> Result<HitIndex, E> {
    let alignment = alignment.as_ref();
    if alignment == Path::new("-") {
        log::info!("Reading alignments from stdin");
        builder.read_all(std::io::stdin().lock())
    } else {
        log::info!("Reading alignments from {}", alignment.display());
        let f = File::open(alignment)?;
        builder.read_all(BufReader::new(f))
    }
}

// Tests
#[cfg(test)]
mod tests {

    /// Write an executable shell script standing in for samtools.
    #[cfg(unix)]
    fn fake_samtools(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("samtools");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn sam_records_from_file() {
        use super::sam_records;
        use crate::hits::HitIndexBuilder;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hits.sam");
        std::fs::write(&path, b"@SQ\tSN:Amborella-5968\tLN:300\nreadA\t0\tAmborella-5968\t1\t60\t4M\t*\t0\t0\tACGT\tIIII\nreadB\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n").unwrap();

        let got = sam_records(&path, HitIndexBuilder::new()).unwrap();

        assert_eq!(got.len(), 1);
        assert_eq!(got.get("readA").unwrap().iter().map(|x| x.as_str()).collect::<Vec<&str>>(), vec!["5968"]);
    }

    #[test]
    fn missing_tool_is_external_tool_error() {
        use super::mapped_records;
        use super::ExternalToolError;
        use crate::hits::HitIndexBuilder;

        let got = mapped_records("reads.bam", "/nonexistent/bin/samtools", HitIndexBuilder::new()).unwrap_err();

        let err = got.downcast_ref::<ExternalToolError>().unwrap();
        assert!(err.command.starts_with("/nonexistent/bin/samtools view -F 4"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_reports_status() {
        use super::mapped_records;
        use super::ExternalToolError;
        use crate::hits::HitIndexBuilder;

        // `false view -F 4 x` exits with status 1 without output.
        let got = mapped_records("reads.bam", "false", HitIndexBuilder::new()).unwrap_err();

        assert!(got.downcast_ref::<ExternalToolError>().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn mapped_records_from_tool_output() {
        use super::mapped_records;
        use crate::hits::HitIndexBuilder;

        let tmp = tempfile::tempdir().unwrap();
        let samtools = fake_samtools(tmp.path(), concat!(
            "[ \"$1 $2 $3\" = \"view -F 4\" ] || exit 3\n",
            "printf '@SQ\\tSN:Amborella-5968\\tLN:300\\n'\n",
            "printf 'readA/1\\t65\\tAmborella-5968\\t1\\t60\\t4M\\t*\\t0\\t0\\tACGT\\tIIII\\n'\n",
            "printf 'readA/1\\t65\\tAmborella-6128\\t1\\t60\\t4M\\t*\\t0\\t0\\tACGT\\tIIII\\n'\n",
            "printf 'readB\\t0\\tNymphaea-7\\t1\\t60\\t4M\\t*\\t0\\t0\\tACGT\\tIIII\\n'",
        ));

        let got = mapped_records("reads.bam", &samtools, HitIndexBuilder::new().strip_mate_suffix(true)).unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(got.get("readA").unwrap().iter().map(|x| x.as_str()).collect::<Vec<&str>>(), vec!["5968", "6128"]);
        assert_eq!(got.get("readB").unwrap().iter().map(|x| x.as_str()).collect::<Vec<&str>>(), vec!["7"]);
    }

    #[cfg(unix)]
    #[test]
    fn tool_output_parse_error_wins_over_exit_status() {
        use super::mapped_records;
        use super::ExternalToolError;
        use crate::hits::HitIndexBuilder;
        use crate::hits::InvalidTargetError;

        let tmp = tempfile::tempdir().unwrap();
        // Keeps writing until the pipe is closed, then dies from SIGPIPE.
        let samtools = fake_samtools(tmp.path(), concat!(
            "printf 'readA\\t0\\tAmborella-\\t1\\t60\\t4M\\t*\\t0\\t0\\tACGT\\tIIII\\n'\n",
            "while :; do printf 'readB\\t0\\tAmborella-7\\t1\\t60\\t4M\\t*\\t0\\t0\\tACGT\\tIIII\\n' || exit 1; done",
        ));

        let got = mapped_records("reads.bam", &samtools, HitIndexBuilder::new()).unwrap_err();

        assert!(got.downcast_ref::<InvalidTargetError>().is_some());
        assert!(got.downcast_ref::<ExternalToolError>().is_none());
    }
}
