// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use crate::{
    format::bootimage::{
        self, BootImageDescriptor, Capacity, InitBootDescriptor, ParseOptions,
        VendorBootDescriptor,
    },
    stream::{FileLen, ReadAt, SectionReaderAt},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageKind {
    /// Detect from the magic.
    #[default]
    Auto,
    Boot,
    VendorBoot,
    InitBoot,
}

pub fn open_image(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open for reading: {path:?}"))
}

pub fn parse_options(reader: &dyn ReadAt, signature_header_skip: u64) -> Result<ParseOptions> {
    Ok(ParseOptions {
        signature_header_skip,
        capacity: Capacity::of(reader).context("Failed to get image size")?,
        ..Default::default()
    })
}

fn display_info<T: fmt::Debug + fmt::Display>(cli: &InfoCli, descriptor: &T) {
    if cli.debug {
        println!("{descriptor:#?}");
    } else {
        println!("{descriptor}");
    }
}

pub fn info_main(cli: &InfoCli) -> Result<()> {
    let file = open_image(&cli.input)?;
    let file_len = file.file_len().context("Failed to get file size")?;
    let file = SectionReaderAt::new(&file, cli.offset, file_len.saturating_sub(cli.offset));
    let options = parse_options(&file, cli.signature_header_skip)?;
    let context = || format!("Failed to parse image: {:?}", cli.input);

    let kind = match cli.kind {
        ImageKind::Auto => match VendorBootDescriptor::parse(&file, &options) {
            Err(bootimage::Error::MagicNotFound(_, _)) => ImageKind::Boot,
            _ => ImageKind::VendorBoot,
        },
        k => k,
    };

    match kind {
        ImageKind::Auto | ImageKind::Boot => {
            let d = BootImageDescriptor::parse(&file, &options).with_context(context)?;
            display_info(cli, &d);
        }
        ImageKind::VendorBoot => {
            let d = VendorBootDescriptor::parse(&file, &options).with_context(context)?;
            display_info(cli, &d);
        }
        ImageKind::InitBoot => {
            let d = InitBootDescriptor::parse(&file, &options).with_context(context)?;
            display_info(cli, &d);
        }
    }

    Ok(())
}

/// Display boot image header information.
#[derive(Debug, Parser)]
pub struct InfoCli {
    /// Path to input image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Type of image.
    #[arg(short, long, value_name = "KIND", default_value = "auto")]
    kind: ImageKind,

    /// Offset of the image within the input file, eg. a partition inside a
    /// full disk dump.
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    offset: u64,

    /// Offset of the image if it is preceded by a signature header.
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    signature_header_skip: u64,

    /// Print header information in debug format.
    #[arg(short, long)]
    debug: bool,
}
