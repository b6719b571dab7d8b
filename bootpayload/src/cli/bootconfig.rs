// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use bstr::ByteSlice;
use clap::{Parser, Subcommand};

use crate::{
    cli::{self, status},
    format::bootconfig::{self, TRAILER_SIZE, Trailer},
};

fn append_subcommand(cli: &AppendCli) -> Result<()> {
    let mut data =
        fs::read(&cli.input).with_context(|| format!("Failed to read: {:?}", cli.input))?;
    let params =
        fs::read(&cli.params).with_context(|| format!("Failed to read: {:?}", cli.params))?;

    let current_size = data.len();
    // Room for the parameters and a new trailer.
    data.resize(current_size + params.len() + TRAILER_SIZE, 0);

    let applied = bootconfig::append_params(&params, &mut data, current_size)
        .with_context(|| format!("Failed to append parameters to {:?}", cli.input))?;
    data.truncate(applied.size);

    if !bootconfig::has_trailer(&data, data.len()) {
        bail!("Bootconfig has no trailer after appending");
    }

    let output = cli.output.as_ref().unwrap_or(&cli.input);
    fs::write(output, &data).with_context(|| format!("Failed to write: {output:?}"))?;

    status!(
        "Appended {} bytes; bootconfig is now {} bytes",
        applied.written,
        applied.size,
    );

    Ok(())
}

fn check_subcommand(cli: &CheckCli) -> Result<()> {
    let data = fs::read(&cli.input).with_context(|| format!("Failed to read: {:?}", cli.input))?;

    if !bootconfig::has_trailer(&data, data.len()) {
        cli::warning!("{:?} has no bootconfig trailer", cli.input);
        bail!("No trailer found");
    }

    let trailer = Trailer::verify(&data, data.len())
        .with_context(|| format!("Invalid bootconfig trailer: {:?}", cli.input))?;

    status!(
        "Trailer covers {} bytes with checksum {:#010x}",
        trailer.params_size,
        trailer.checksum,
    );

    if cli.print {
        let params = trailer.params(&data, data.len())?;
        print!("{}", params.as_bstr());
    }

    Ok(())
}

pub fn bootconfig_main(cli: &BootConfigCli) -> Result<()> {
    match &cli.command {
        BootConfigCommand::Append(c) => append_subcommand(c),
        BootConfigCommand::Check(c) => check_subcommand(c),
    }
}

/// Append parameters to a bootconfig file and rewrite its trailer.
#[derive(Debug, Parser)]
struct AppendCli {
    /// Path to bootconfig file, with or without a trailer.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to file containing `key=value` lines to append.
    #[arg(short, long, value_name = "FILE", value_parser)]
    params: PathBuf,

    /// Path to output file. Defaults to overwriting the input.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: Option<PathBuf>,
}

/// Verify a bootconfig trailer and its checksum.
#[derive(Debug, Parser)]
struct CheckCli {
    /// Path to bootconfig file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Print the parameters covered by the trailer.
    #[arg(long)]
    print: bool,
}

#[derive(Debug, Subcommand)]
enum BootConfigCommand {
    Append(AppendCli),
    Check(CheckCli),
}

/// Inspect or modify bootconfig parameter files.
#[derive(Debug, Parser)]
pub struct BootConfigCli {
    #[command(subcommand)]
    command: BootConfigCommand,
}
