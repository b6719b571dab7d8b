// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::{
    cli::{self, info::open_image},
    config::Config,
    payload::{
        BootContext, BootMode, ChosenBootConfig, ImageSource, PayloadAssembler, PayloadSources,
    },
};

fn open_optional(path: Option<&Path>) -> Result<Option<File>> {
    path.map(open_image).transpose()
}

fn source(file: &File) -> Result<ImageSource<'_>> {
    ImageSource::partition(file).context("Failed to get image size")
}

pub fn assemble_main(cli: &AssembleCli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(skip) = cli.signature_header_skip {
        config.signature_header_skip = skip;
    }
    if let Some(mode) = cli.boot_mode {
        config.boot_mode = mode;
    }
    if cli.migrate_cmdline {
        config.migrate_cmdline = true;
    }

    let boot = open_image(&cli.boot)?;
    let vendor_boot = open_optional(cli.vendor_boot.as_deref())?;
    let init_boot = open_optional(cli.init_boot.as_deref())?;

    let sources = PayloadSources {
        boot: source(&boot)?,
        vendor_boot: vendor_boot.as_ref().map(source).transpose()?,
        init_boot: init_boot.as_ref().map(source).transpose()?,
    };

    let mut importer = match &cli.dtb_bootconfig {
        Some(path) => ChosenBootConfig(Some(
            fs::read(path).with_context(|| format!("Failed to read bootconfig: {path:?}"))?,
        )),
        None => ChosenBootConfig(None),
    };

    let pending = config.pending_updates()?;
    let mut context = BootContext::new();
    let mut assembler = PayloadAssembler::new(config.assembler_options());

    assembler
        .assemble(&sources, &mut importer, &pending, &mut context)
        .context("Failed to assemble boot payload")?;

    let Some(kernel) = context.take_kernel() else {
        bail!("No kernel was published");
    };
    fs::write(&cli.output_kernel, &kernel)
        .with_context(|| format!("Failed to write kernel: {:?}", cli.output_kernel))?;
    cli::status!("Wrote {} byte kernel to {:?}", kernel.len(), cli.output_kernel);

    match context.take_initrd() {
        Some(initrd) => {
            fs::write(&cli.output_initrd, initrd.committed())
                .with_context(|| format!("Failed to write initrd: {:?}", cli.output_initrd))?;
            cli::status!(
                "Wrote initrd to {:?}: {} ramdisk bytes, {} bootconfig bytes",
                cli.output_initrd,
                initrd.ramdisk_size(),
                initrd.committed_size() - initrd.ramdisk_size(),
            );
        }
        None => cli::warning!("Image has no ramdisk; not writing initrd"),
    }

    Ok(())
}

/// Assemble the kernel and initrd from boot partition images.
#[derive(Debug, Parser)]
pub struct AssembleCli {
    /// Path to boot image.
    #[arg(long, value_name = "FILE", value_parser)]
    boot: PathBuf,

    /// Path to vendor boot image.
    #[arg(long, value_name = "FILE", value_parser)]
    vendor_boot: Option<PathBuf>,

    /// Path to init boot image.
    #[arg(long, value_name = "FILE", value_parser)]
    init_boot: Option<PathBuf>,

    /// Path to raw /chosen/bootconfig device tree property.
    #[arg(long, value_name = "FILE", value_parser)]
    dtb_bootconfig: Option<PathBuf>,

    /// Path to TOML config.
    #[arg(short, long, value_name = "FILE", value_parser)]
    config: Option<PathBuf>,

    /// Offset of each image if it is preceded by a signature header.
    #[arg(long, value_name = "BYTES")]
    signature_header_skip: Option<u64>,

    /// Boot mode.
    #[arg(long, value_name = "MODE")]
    boot_mode: Option<BootMode>,

    /// Move androidboot.* options from the kernel command line to bootconfig.
    #[arg(long)]
    migrate_cmdline: bool,

    /// Path to output kernel.
    #[arg(long, value_name = "FILE", value_parser)]
    output_kernel: PathBuf,

    /// Path to output initrd.
    #[arg(long, value_name = "FILE", value_parser)]
    output_initrd: PathBuf,
}
