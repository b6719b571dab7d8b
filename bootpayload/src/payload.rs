// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Assembly of the kernel and initrd handed to Linux.
//!
//! The initrd is a single buffer laid out as:
//!
//! ```text
//! [vendor ramdisk][generic or init boot ramdisk][bootconfig][trailer][free]
//! ```
//!
//! The free space at the end allows later stages to append more bootconfig
//! parameters with [`LoadedInitrd::append_bootconfig`].

use std::{collections::TryReserveError, fmt, io};

use bstr::ByteSlice;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    cmdline::{self, BootConfigUpdate},
    error::ErrorKind,
    format::{
        bootconfig::{self, Applied},
        bootimage::{
            self, BootImageDescriptor, Capacity, InitBootDescriptor, ParseOptions,
            VendorBootDescriptor,
        },
        padding,
    },
    stream::ReadAt,
};

/// Space reserved after the ramdisks for bootconfig parameters that are added
/// after the vendor boot image's own bootconfig section.
pub const BOOTCONFIG_RESERVE: usize = 1024;

/// Allocation granularity of the initrd buffer.
pub const BUFFER_ALIGNMENT: usize = 4096;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Boot image has no kernel")]
    NoKernel,
    #[error("Failed to parse {0} image")]
    Image(&'static str, #[source] bootimage::Error),
    #[error("Failed to reserve {0} bytes")]
    Reserve(usize, #[source] TryReserveError),
    #[error("{0:?} overflowed integer bounds during calculations")]
    IntOverflow(&'static str),
    #[error("Failed to read {0}")]
    DataRead(&'static str, #[source] io::Error),
    #[error("Failed to update bootconfig: {0}")]
    BootConfig(&'static str, #[source] bootconfig::Error),
    #[error("Failed to migrate kernel command line parameters")]
    Cmdline(#[source] cmdline::Error),
    #[error("Failed to import bootconfig from the device tree")]
    Import(#[source] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoKernel => ErrorKind::NotFound,
            Self::Image(_, e) => e.kind(),
            Self::Reserve(_, _) | Self::IntOverflow(_) => ErrorKind::OutOfResources,
            Self::DataRead(_, _) | Self::Import(_) => ErrorKind::DeviceError,
            Self::BootConfig(_, e) => e.kind(),
            Self::Cmdline(e) => e.kind(),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BootMode {
    #[default]
    Normal,
    /// Recovery uses the generic ramdisk only.
    Recovery,
    /// Userspace fastboot uses the generic ramdisk only.
    FastbootUserspace,
}

impl BootMode {
    fn uses_vendor_ramdisk(self) -> bool {
        self == Self::Normal
    }
}

/// Source of the `/chosen/bootconfig` device tree property.
pub trait BootConfigImporter {
    /// Return the raw property value, or [`None`] if the property does not
    /// exist.
    fn chosen_bootconfig(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Importer for a property value that was read ahead of time.
#[derive(Clone, Debug, Default)]
pub struct ChosenBootConfig(pub Option<Vec<u8>>);

impl BootConfigImporter for ChosenBootConfig {
    fn chosen_bootconfig(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.0.clone())
    }
}

/// An image and the size of the container it was found in.
#[derive(Clone, Copy)]
pub struct ImageSource<'a> {
    pub reader: &'a dyn ReadAt,
    pub capacity: Capacity,
}

impl<'a> ImageSource<'a> {
    /// An image inside a partition or file. The capacity is the length of the
    /// reader.
    pub fn partition(reader: &'a dyn ReadAt) -> io::Result<Self> {
        Ok(Self {
            reader,
            capacity: Capacity::of(reader)?,
        })
    }

    /// An image that is already resident in memory.
    pub fn resident(reader: &'a dyn ReadAt) -> Self {
        Self {
            reader,
            capacity: Capacity::Unbounded,
        }
    }
}

impl fmt::Debug for ImageSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PayloadSources<'a> {
    pub boot: ImageSource<'a>,
    pub vendor_boot: Option<ImageSource<'a>>,
    pub init_boot: Option<ImageSource<'a>>,
}

#[derive(Clone, Copy, Debug)]
pub struct AssemblerOptions {
    pub signature_header_skip: u64,
    pub cmdline_capacity: usize,
    pub boot_mode: BootMode,
    /// Move `androidboot.*` options from the embedded kernel command lines
    /// into bootconfig.
    pub migrate_cmdline: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            signature_header_skip: 0,
            cmdline_capacity: bootimage::CMDLINE_MAX_SIZE,
            boot_mode: BootMode::Normal,
            migrate_cmdline: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Init,
    KernelLoaded,
    RamdiskSized,
    RamdiskLoaded,
    VendorRamdiskLoaded,
    BootConfigLoaded,
    TrailerFinalized,
    Published,
}

/// The assembled initrd buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct LoadedInitrd {
    buffer: Vec<u8>,
    ramdisk_size: usize,
    committed_size: usize,
}

impl LoadedInitrd {
    /// The concatenated ramdisks only.
    pub fn ramdisk(&self) -> &[u8] {
        &self.buffer[..self.ramdisk_size]
    }

    /// The bootconfig parameters, including the trailer.
    pub fn bootconfig(&self) -> &[u8] {
        &self.buffer[self.ramdisk_size..self.committed_size]
    }

    /// Everything that has been written, ramdisks and bootconfig.
    pub fn committed(&self) -> &[u8] {
        &self.buffer[..self.committed_size]
    }

    pub fn ramdisk_size(&self) -> usize {
        self.ramdisk_size
    }

    pub fn committed_size(&self) -> usize {
        self.committed_size
    }

    /// Size of the whole buffer, including the unused tail.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Append bootconfig parameters into the reserved tail of the buffer.
    pub fn append_bootconfig(&mut self, params: &[u8]) -> bootconfig::Result<Applied> {
        let region = &mut self.buffer[self.ramdisk_size..];
        let applied =
            bootconfig::append_params(params, region, self.committed_size - self.ramdisk_size)?;

        self.committed_size = self.ramdisk_size + applied.size;

        Ok(applied)
    }
}

impl fmt::Debug for LoadedInitrd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedInitrd")
            .field("capacity", &self.buffer.len())
            .field("ramdisk_size", &self.ramdisk_size)
            .field("committed_size", &self.committed_size)
            .field("bootconfig", &self.bootconfig().as_bstr())
            .finish()
    }
}

/// Caller-owned record of what the assembler produced. It is created before
/// assembly and consumed by the stage that starts the kernel.
#[derive(Debug, Default)]
pub struct BootContext {
    kernel: Option<Vec<u8>>,
    initrd: Option<LoadedInitrd>,
    published: bool,
}

impl BootContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&mut self, kernel: Vec<u8>, initrd: Option<LoadedInitrd>) {
        self.kernel = Some(kernel);
        self.initrd = initrd;
        self.published = true;
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn kernel(&self) -> Option<&[u8]> {
        self.kernel.as_deref()
    }

    pub fn initrd(&self) -> Option<&LoadedInitrd> {
        self.initrd.as_ref()
    }

    pub fn initrd_mut(&mut self) -> Option<&mut LoadedInitrd> {
        self.initrd.as_mut()
    }

    pub fn take_kernel(&mut self) -> Option<Vec<u8>> {
        self.kernel.take()
    }

    /// Hand off the initrd. Subsequent calls return [`None`].
    pub fn take_initrd(&mut self) -> Option<LoadedInitrd> {
        self.initrd.take()
    }
}

/// Where the generic ramdisk comes from.
#[derive(Clone, Copy)]
struct RamdiskSource<'a> {
    reader: &'a dyn ReadAt,
    offset: u64,
    size: usize,
    name: &'static str,
}

struct Descriptors {
    boot: BootImageDescriptor,
    vendor_boot: Option<VendorBootDescriptor>,
    init_boot: Option<InitBootDescriptor>,
}

fn try_alloc(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|e| Error::Reserve(size, e))?;
    buf.resize(size, 0);

    Ok(buf)
}

/// Builds the kernel and initrd from a boot image and optional vendor boot and
/// init boot images.
pub struct PayloadAssembler {
    options: AssemblerOptions,
    state: State,
    kernel: Vec<u8>,
    buffer: Vec<u8>,
}

impl PayloadAssembler {
    pub fn new(options: AssemblerOptions) -> Self {
        Self {
            options,
            state: State::Init,
            kernel: Vec::new(),
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Number of bytes currently reserved for the initrd.
    pub fn reserved(&self) -> usize {
        self.buffer.len()
    }

    fn transition(&mut self, state: State) {
        debug!("Payload state: {:?} -> {state:?}", self.state);
        self.state = state;
    }

    fn rollback(&mut self) {
        debug!("Rolling back from {:?}", self.state);
        self.state = State::Init;
        self.kernel = Vec::new();
        self.buffer = Vec::new();
    }

    fn parse_options(&self, source: &ImageSource) -> ParseOptions {
        ParseOptions {
            signature_header_skip: self.options.signature_header_skip,
            capacity: source.capacity,
            cmdline_capacity: self.options.cmdline_capacity,
        }
    }

    /// Parse an optional image. Images that are absent or unusable are
    /// skipped.
    fn parse_optional<T>(
        &self,
        source: Option<&ImageSource>,
        name: &'static str,
        parse: impl FnOnce(&dyn ReadAt, &ParseOptions) -> bootimage::Result<T>,
    ) -> Result<Option<T>> {
        let Some(source) = source else {
            return Ok(None);
        };

        match parse(source.reader, &self.parse_options(source)) {
            Ok(d) => Ok(Some(d)),
            Err(e) if e.kind().is_absent() => {
                warn!("Ignoring {name} image ({}): {e}", e.kind());
                Ok(None)
            }
            Err(e) => Err(Error::Image(name, e)),
        }
    }

    fn parse_all(&self, sources: &PayloadSources) -> Result<Descriptors> {
        let options = self.parse_options(&sources.boot);
        let boot = BootImageDescriptor::parse(sources.boot.reader, &options)
            .map_err(|e| Error::Image("boot", e))?;
        let vendor_boot =
            self.parse_optional(sources.vendor_boot.as_ref(), "vendor_boot", |r, o| {
                VendorBootDescriptor::parse(r, o)
            })?;
        let init_boot = self.parse_optional(sources.init_boot.as_ref(), "init_boot", |r, o| {
            InitBootDescriptor::parse(r, o)
        })?;

        Ok(Descriptors {
            boot,
            vendor_boot,
            init_boot,
        })
    }

    /// Run the whole assembly and publish the result into `context`. On
    /// failure, everything that was reserved is released and the assembler
    /// returns to [`State::Init`].
    pub fn assemble(
        &mut self,
        sources: &PayloadSources,
        importer: &mut dyn BootConfigImporter,
        pending: &BootConfigUpdate,
        context: &mut BootContext,
    ) -> Result<()> {
        if self.state != State::Init {
            self.rollback();
        }

        match self.run(sources, importer, pending, context) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn run(
        &mut self,
        sources: &PayloadSources,
        importer: &mut dyn BootConfigImporter,
        pending: &BootConfigUpdate,
        context: &mut BootContext,
    ) -> Result<()> {
        let d = self.parse_all(sources)?;

        self.load_kernel(sources.boot.reader, &d.boot)?;

        let Some(ramdisk) = self.size_ramdisk(sources, &d)? else {
            info!("Boot image v{} has no ramdisk", d.boot.header_version());
            context.publish(std::mem::take(&mut self.kernel), None);
            self.transition(State::Published);
            return Ok(());
        };

        let vendor_ramdisk_size = self.load_ramdisks(sources, &d, ramdisk)?;
        let ramdisk_size = vendor_ramdisk_size + ramdisk.size;

        let mut bootconfig_size = 0;

        if d.boot.header_version() >= 3 {
            if let (Some(vendor), Some(source)) = (&d.vendor_boot, &sources.vendor_boot) {
                let mut updates = pending.clone();
                if self.options.migrate_cmdline {
                    for cmdline in [&d.boot.kernel_cmdline, &vendor.kernel_cmdline] {
                        cmdline::migrate_androidboot_args(Some(&cmdline[..]), &mut updates)
                            .map_err(Error::Cmdline)?;
                    }
                }

                bootconfig_size =
                    self.load_bootconfig(source.reader, vendor, ramdisk_size, importer, &updates)?;
            }
        }

        let committed_size = ramdisk_size + bootconfig_size;
        info!("Assembled initrd: {ramdisk_size} ramdisk bytes, {bootconfig_size} bootconfig bytes");

        let initrd = LoadedInitrd {
            buffer: std::mem::take(&mut self.buffer),
            ramdisk_size,
            committed_size,
        };
        context.publish(std::mem::take(&mut self.kernel), Some(initrd));
        self.transition(State::Published);

        Ok(())
    }

    fn load_kernel(&mut self, reader: &dyn ReadAt, boot: &BootImageDescriptor) -> Result<()> {
        let size = boot.kernel_size() as usize;
        if size == 0 {
            return Err(Error::NoKernel);
        }

        let mut kernel = try_alloc(size)?;
        reader
            .read_exact_at(&mut kernel, boot.kernel_offset())
            .map_err(|e| Error::DataRead("kernel", e))?;

        self.kernel = kernel;
        self.transition(State::KernelLoaded);

        Ok(())
    }

    /// Determine where the generic ramdisk comes from and reserve the initrd
    /// buffer. Returns [`None`] for pre-GKI images without a ramdisk.
    fn size_ramdisk<'a>(
        &mut self,
        sources: &PayloadSources<'a>,
        d: &Descriptors,
    ) -> Result<Option<RamdiskSource<'a>>> {
        let boot = &d.boot;

        if boot.header_version() < 3 && boot.ramdisk_size() == 0 {
            return Ok(None);
        }

        let source = match (&d.init_boot, &sources.init_boot) {
            (Some(init), Some(s)) if boot.ramdisk_size() == 0 => RamdiskSource {
                reader: s.reader,
                offset: init.ramdisk_offset(),
                size: init.ramdisk_size as usize,
                name: "init_boot_ramdisk",
            },
            _ => RamdiskSource {
                reader: sources.boot.reader,
                offset: boot.ramdisk_offset(),
                size: boot.ramdisk_size() as usize,
                name: "ramdisk",
            },
        };

        let mut size = source.size;

        if let Some(vendor) = &d.vendor_boot {
            if self.options.boot_mode.uses_vendor_ramdisk() {
                size += vendor.vendor_ramdisk_size as usize;
            }
            size += vendor.bootconfig_size as usize;
        }

        let size = size
            .checked_add(BOOTCONFIG_RESERVE)
            .and_then(|s| padding::round(s, BUFFER_ALIGNMENT))
            .ok_or(Error::IntOverflow("initrd_size"))?;

        debug!(
            "Reserving {size} bytes for initrd; generic ramdisk from {}",
            source.name,
        );

        self.buffer = try_alloc(size)?;
        self.transition(State::RamdiskSized);

        Ok(Some(source))
    }

    /// Copy the vendor ramdisk followed by the generic ramdisk. Returns the
    /// number of vendor ramdisk bytes.
    fn load_ramdisks(
        &mut self,
        sources: &PayloadSources,
        d: &Descriptors,
        ramdisk: RamdiskSource,
    ) -> Result<usize> {
        let mut vendor_size = 0;

        if let (Some(vendor), Some(source)) = (&d.vendor_boot, &sources.vendor_boot) {
            if self.options.boot_mode.uses_vendor_ramdisk() {
                vendor_size = vendor.vendor_ramdisk_size as usize;

                let offset = vendor.vendor_ramdisk_offset();
                source
                    .reader
                    .read_exact_at(&mut self.buffer[..vendor_size], offset)
                    .map_err(|e| Error::DataRead("vendor_ramdisk", e))?;
                self.transition(State::VendorRamdiskLoaded);
            } else {
                debug!("Skipping vendor ramdisk in {:?} mode", self.options.boot_mode);
            }
        }

        let range = vendor_size..vendor_size + ramdisk.size;
        ramdisk
            .reader
            .read_exact_at(&mut self.buffer[range], ramdisk.offset)
            .map_err(|e| Error::DataRead(ramdisk.name, e))?;
        self.transition(State::RamdiskLoaded);

        Ok(vendor_size)
    }

    /// Copy the vendor bootconfig section after the ramdisks and append the
    /// device tree and pending parameters. Returns the bootconfig size,
    /// including the trailer.
    fn load_bootconfig(
        &mut self,
        reader: &dyn ReadAt,
        vendor: &VendorBootDescriptor,
        ramdisk_size: usize,
        importer: &mut dyn BootConfigImporter,
        updates: &BootConfigUpdate,
    ) -> Result<usize> {
        let region = &mut self.buffer[ramdisk_size..];
        let mut size = vendor.bootconfig_size as usize;

        if size != 0 {
            reader
                .read_exact_at(&mut region[..size], vendor.bootconfig_offset())
                .map_err(|e| Error::DataRead("vendor_bootconfig", e))?;

            size += bootconfig::add_trailer(region, size)
                .map_err(|e| Error::BootConfig("vendor_bootconfig", e))?;
        }
        self.transition(State::BootConfigLoaded);

        let region = &mut self.buffer[ramdisk_size..];

        match importer.chosen_bootconfig().map_err(Error::Import)? {
            Some(data) => {
                // Device tree string properties are NUL-terminated.
                let params = data.trim_end_with(|c| c == '\0');
                if params.is_empty() {
                    debug!("Device tree bootconfig property is empty");
                } else {
                    size = bootconfig::append_params(params, region, size)
                        .map_err(|e| Error::BootConfig("device_tree", e))?
                        .size;
                }
            }
            None => debug!("No bootconfig in device tree"),
        }

        if !updates.is_empty() {
            size = bootconfig::append_params(updates.as_bytes(), region, size)
                .map_err(|e| Error::BootConfig("pending_updates", e))?
                .size;
        }

        if size != 0 {
            size += bootconfig::add_trailer(region, size)
                .map_err(|e| Error::BootConfig("trailer", e))?;
        }
        self.transition(State::TrailerFinalized);

        Ok(size)
    }
}
