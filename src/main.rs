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
use clap::Parser;

use distribute_reads::AlignmentInput;
use distribute_reads::RunOptions;
use distribute_reads::distribute::DistributeOptions;

mod cli;

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) {
    stderrlog::new()
    .module(module_path!())
    .quiet(false)
    .verbosity(log_max_level)
    .timestamp(stderrlog::Timestamp::Off)
    .init()
    .unwrap();
}

fn main() {
    let cli = cli::Cli::parse();
    init_log(if cli.verbose { 3 } else { 2 });

    let alignment_input = if cli.sam {
        AlignmentInput::Sam
    } else {
        AlignmentInput::Samtools(cli.samtools.clone())
    };

    let opts = RunOptions {
        alignment: cli.alignment.clone(),
        alignment_input,
        read_files: cli.read_files.clone(),
        out_dir: cli.out_dir.clone(),
        distribute: DistributeOptions {
            layout: cli.layout(),
            merged: cli.merged,
            policy: cli.pair_policy,
        },
        strip_hit_suffix: cli.strip_hit_suffix,
        max_open: cli.max_open,
    };
    log::debug!("Running with alignment {} and reads {:?}", opts.alignment.display(), opts.read_files);

    match distribute_reads::run(&opts) {
        Ok(stats) => {
            log::info!("Wrote {} reads or read pairs to {} targets", stats.writes, stats.targets);
        },
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        },
    }
}
