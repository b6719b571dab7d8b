// SPDX-FileCopyrightText: 2023-2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fmt, io, mem};

use bstr::{BString, ByteSlice};
use thiserror::Error;
use tracing::{debug, trace, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    error::ErrorKind,
    format::padding::{self, ZeroPadding},
    stream::{FileLen, ReadAt},
};

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_EXTRA_ARGS_SIZE: usize = 1024;

pub const VENDOR_BOOT_MAGIC: [u8; 8] = *b"VNDRBOOT";
pub const VENDOR_BOOT_ARGS_SIZE: usize = 2048;
pub const VENDOR_BOOT_NAME_SIZE: usize = 16;

pub const VENDOR_RAMDISK_NAME_SIZE: usize = 32;
pub const VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE: usize = 16;

/// Page size of v3+ boot images. Unlike older versions, it is not stored in
/// the header.
pub const PAGE_SIZE: u32 = 4096;

/// Default size of the buffer that receives the embedded kernel command line.
/// This is large enough for every header version.
pub const CMDLINE_MAX_SIZE: usize = VENDOR_BOOT_ARGS_SIZE;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Magic {:?} not found at offset 0 or {}", .0.as_bstr(), .1)]
    MagicNotFound([u8; 8], u64),
    #[error("Unknown header version: {0}")]
    UnknownHeaderVersion(u32),
    #[error("Page size {page_size} is not a power of two above the header size ({header_size})")]
    InvalidPageSize { page_size: u32, header_size: u32 },
    #[error("{0:?} overflowed integer bounds during calculations")]
    IntOverflow(&'static str),
    #[error("Invalid vendor v4 ramdisk table size: {actual} != {expected}")]
    VendorV4InvalidRamdiskTableSize { actual: u32, expected: u32 },
    #[error("Invalid vendor v4 ramdisk entry size: {0}")]
    VendorV4InvalidRamdiskEntrySize(u32),
    #[error("Image size ({image_size}) exceeds capacity ({capacity})")]
    ExceedsCapacity { image_size: u64, capacity: u64 },
    #[error("Failed to read boot image data: {0}")]
    DataRead(&'static str, #[source] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownHeaderVersion(_) => ErrorKind::IncompatibleVersion,
            Self::DataRead(_, _) => ErrorKind::DeviceError,
            Self::MagicNotFound(_, _)
            | Self::InvalidPageSize { .. }
            | Self::IntOverflow(_)
            | Self::VendorV4InvalidRamdiskTableSize { .. }
            | Self::VendorV4InvalidRamdiskEntrySize(_)
            | Self::ExceedsCapacity { .. } => ErrorKind::NotFound,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Number of bytes available to an image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capacity {
    /// A partition or file of a known size.
    Bounded(u64),
    /// An image that is already resident in memory and has no container to
    /// overflow.
    Unbounded,
}

impl Capacity {
    /// Use the length of the reader as the capacity.
    pub fn of(reader: &(impl FileLen + ?Sized)) -> io::Result<Self> {
        reader.file_len().map(Self::Bounded)
    }
}

/// Verify that an image with the computed total size fits in its container.
pub fn check_fit(image_size: u64, capacity: Capacity) -> Result<()> {
    match capacity {
        Capacity::Bounded(capacity) if image_size > capacity => Err(Error::ExceedsCapacity {
            image_size,
            capacity,
        }),
        _ => Ok(()),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    /// Offset of the real image when it is preceded by a signing envelope.
    /// Zero disables the second probe.
    pub signature_header_skip: u64,
    pub capacity: Capacity,
    /// Size of the buffer that receives the embedded kernel command line.
    pub cmdline_capacity: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            signature_header_skip: 0,
            capacity: Capacity::Unbounded,
            cmdline_capacity: CMDLINE_MAX_SIZE,
        }
    }
}

/// Raw on-disk layout for the fields shared by every boot image version. This
/// is just enough to find the magic and the header version.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVersionHeader {
    /// Magic value. This should be equal to [`BOOT_MAGIC`].
    magic: [u8; 8],
    reserved: [little_endian::U32; 8],
    header_version: little_endian::U32,
}

/// Raw on-disk layout for the v0 image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawV0 {
    /// Magic value. This should be equal to [`BOOT_MAGIC`].
    magic: [u8; 8],
    kernel_size: little_endian::U32,
    kernel_addr: little_endian::U32,
    ramdisk_size: little_endian::U32,
    ramdisk_addr: little_endian::U32,
    second_size: little_endian::U32,
    second_addr: little_endian::U32,
    tags_addr: little_endian::U32,
    page_size: little_endian::U32,
    header_version: little_endian::U32,
    os_version: little_endian::U32,
    name: [u8; BOOT_NAME_SIZE],
    cmdline: [u8; BOOT_ARGS_SIZE],
    id: [little_endian::U32; 8],
    extra_cmdline: [u8; BOOT_EXTRA_ARGS_SIZE],
}

/// Raw on-disk layout for the extra v1 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawV1Extra {
    recovery_dtbo_size: little_endian::U32,
    recovery_dtbo_offset: little_endian::U64,
    header_size: little_endian::U32,
}

/// Raw on-disk layout for the extra v2 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawV2Extra {
    dtb_size: little_endian::U32,
    dtb_addr: little_endian::U64,
}

/// Raw on-disk layout for the v3 image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawV3 {
    /// Magic value. This should be equal to [`BOOT_MAGIC`].
    magic: [u8; 8],
    kernel_size: little_endian::U32,
    ramdisk_size: little_endian::U32,
    os_version: little_endian::U32,
    header_size: little_endian::U32,
    reserved: [little_endian::U32; 4],
    header_version: little_endian::U32,
    cmdline: [u8; BOOT_ARGS_SIZE + BOOT_EXTRA_ARGS_SIZE],
}

/// Raw on-disk layout for the extra v4 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawV4Extra {
    signature_size: little_endian::U32,
}

/// Raw on-disk layout for the fields shared by every vendor boot image
/// version.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorVersionHeader {
    /// Magic value. This should be equal to [`VENDOR_BOOT_MAGIC`].
    magic: [u8; 8],
    header_version: little_endian::U32,
}

/// Raw on-disk layout for the vendor v3 image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorV3 {
    /// Magic value. This should be equal to [`VENDOR_BOOT_MAGIC`].
    magic: [u8; 8],
    header_version: little_endian::U32,
    page_size: little_endian::U32,
    kernel_addr: little_endian::U32,
    ramdisk_addr: little_endian::U32,
    vendor_ramdisk_size: little_endian::U32,
    cmdline: [u8; VENDOR_BOOT_ARGS_SIZE],
    tags_addr: little_endian::U32,
    name: [u8; VENDOR_BOOT_NAME_SIZE],
    header_size: little_endian::U32,
    dtb_size: little_endian::U32,
    dtb_addr: little_endian::U64,
}

/// Raw on-disk layout for the extra vendor v4 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorV4Extra {
    vendor_ramdisk_table_size: little_endian::U32,
    vendor_ramdisk_table_entry_num: little_endian::U32,
    vendor_ramdisk_table_entry_size: little_endian::U32,
    bootconfig_size: little_endian::U32,
}

/// Raw on-disk layout for the vendor v4 ramdisk table entry. Only its size is
/// needed to validate the table.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorV4RamdiskTableEntry {
    ramdisk_size: little_endian::U32,
    ramdisk_offset: little_endian::U32,
    ramdisk_type: little_endian::U32,
    ramdisk_name: [u8; VENDOR_RAMDISK_NAME_SIZE],
    board_id: [little_endian::U32; VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE],
}

fn read_raw<T, R>(reader: &R, offset: u64, field: &'static str) -> Result<T>
where
    T: FromBytes + IntoBytes + KnownLayout + Immutable,
    R: ReadAt + ?Sized,
{
    let mut raw = T::new_zeroed();
    reader
        .read_exact_at(raw.as_mut_bytes(), offset)
        .map_err(|e| Error::DataRead(field, e))?;

    Ok(raw)
}

/// The header must fit in the first page, so the kernel (or vendor ramdisk)
/// always starts exactly one page after the header.
fn check_page_size(page_size: u32, header_size: u32) -> Result<u32> {
    if !padding::is_valid_page_size(page_size) || page_size <= header_size {
        return Err(Error::InvalidPageSize {
            page_size,
            header_size,
        });
    }

    Ok(page_size)
}

/// Sum the page-aligned sizes of consecutive image sections.
fn sections_size(sizes: &[u64], page_size: u32, field: &'static str) -> Result<u64> {
    sizes.iter().try_fold(0u64, |total, size| {
        padding::round(*size, page_size.into())
            .and_then(|s| total.checked_add(s))
            .ok_or(Error::IntOverflow(field))
    })
}

/// Copy a NUL-terminated command line into a buffer of at most `capacity`
/// bytes.
fn copy_cmdline(parts: &[&[u8]], capacity: usize, field: &'static str) -> BString {
    let mut cmdline = BString::default();
    for part in parts {
        cmdline.extend_from_slice(part.until_nul());
    }

    if cmdline.len() > capacity {
        warn!(
            "{field} truncated from {} to {capacity} bytes",
            cmdline.len(),
        );
        cmdline.truncate(capacity);
    }

    cmdline
}

/// Probe for the magic at offset 0 and, if that fails, once more after the
/// signature header. Returns the offset where the magic was found.
fn find_magic<T, R>(
    reader: &R,
    skip: u64,
    magic: [u8; 8],
    get_magic: impl Fn(&T) -> [u8; 8],
    field: &'static str,
) -> Result<(u64, T)>
where
    T: FromBytes + IntoBytes + KnownLayout + Immutable,
    R: ReadAt + ?Sized,
{
    let raw = read_raw::<T, _>(reader, 0, field)?;
    if get_magic(&raw) == magic {
        return Ok((0, raw));
    }

    if skip != 0 {
        trace!("Magic not found at offset 0; retrying at {skip}");

        let raw = read_raw::<T, _>(reader, skip, field)?;
        if get_magic(&raw) == magic {
            return Ok((skip, raw));
        }
    }

    Err(Error::MagicNotFound(magic, skip))
}

/// Fields shared by the v0 through v2 headers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LegacyFields {
    pub kernel_size: u32,
    pub ramdisk_size: u32,
    pub second_size: u32,
    pub page_size: u32,
    pub os_version: u32,
    pub name: BString,
}

/// Fields shared by the v3 and v4 headers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GkiFields {
    pub kernel_size: u32,
    pub ramdisk_size: u32,
    pub os_version: u32,
}

/// Version-specific boot image header. Every version has its own decoder and
/// its own rules for computing the size of the image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BootHeader {
    V0(LegacyFields),
    V1 {
        common: LegacyFields,
        recovery_dtbo_size: u32,
        recovery_dtbo_offset: u64,
    },
    V2 {
        common: LegacyFields,
        recovery_dtbo_size: u32,
        recovery_dtbo_offset: u64,
        dtb_size: u32,
        dtb_addr: u64,
    },
    V3(GkiFields),
    V4 {
        common: GkiFields,
        signature_size: u32,
    },
}

struct DecodedHeader {
    header: BootHeader,
    cmdline: BString,
}

fn decode_legacy(
    raw: &RawV0,
    header_size: usize,
    cmdline_capacity: usize,
) -> Result<(LegacyFields, BString)> {
    let page_size = check_page_size(raw.page_size.get(), header_size as u32)?;

    let fields = LegacyFields {
        kernel_size: raw.kernel_size.get(),
        ramdisk_size: raw.ramdisk_size.get(),
        second_size: raw.second_size.get(),
        page_size,
        os_version: raw.os_version.get(),
        name: raw.name.until_nul().into(),
    };

    let cmdline = copy_cmdline(
        &[&raw.cmdline, &raw.extra_cmdline],
        cmdline_capacity,
        "Boot::V0::cmdline",
    );

    Ok((fields, cmdline))
}

/// Header sizes are informational. Layouts are chosen by the header version.
fn check_header_size(header_size: u32, expected: usize, field: &'static str) {
    if header_size as usize != expected {
        debug!("{field} is {header_size}, but the layout is {expected} bytes");
    }
}

fn decode_v0<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    cmdline_capacity: usize,
) -> Result<DecodedHeader> {
    let raw = read_raw::<RawV0, _>(reader, offset, "Boot::V0::header")?;
    let (common, cmdline) = decode_legacy(&raw, mem::size_of::<RawV0>(), cmdline_capacity)?;

    Ok(DecodedHeader {
        header: BootHeader::V0(common),
        cmdline,
    })
}

fn decode_v1<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    cmdline_capacity: usize,
) -> Result<DecodedHeader> {
    let header_size = mem::size_of::<RawV0>() + mem::size_of::<RawV1Extra>();
    let raw = read_raw::<RawV0, _>(reader, offset, "Boot::V1::header")?;
    let (common, cmdline) = decode_legacy(&raw, header_size, cmdline_capacity)?;

    let raw_v1 = read_raw::<RawV1Extra, _>(
        reader,
        offset + mem::size_of::<RawV0>() as u64,
        "Boot::V1::header",
    )?;
    check_header_size(raw_v1.header_size.get(), header_size, "Boot::V1::header_size");

    Ok(DecodedHeader {
        header: BootHeader::V1 {
            common,
            recovery_dtbo_size: raw_v1.recovery_dtbo_size.get(),
            recovery_dtbo_offset: raw_v1.recovery_dtbo_offset.get(),
        },
        cmdline,
    })
}

fn decode_v2<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    cmdline_capacity: usize,
) -> Result<DecodedHeader> {
    let header_size =
        mem::size_of::<RawV0>() + mem::size_of::<RawV1Extra>() + mem::size_of::<RawV2Extra>();
    let raw = read_raw::<RawV0, _>(reader, offset, "Boot::V2::header")?;
    let (common, cmdline) = decode_legacy(&raw, header_size, cmdline_capacity)?;

    let v1_offset = offset + mem::size_of::<RawV0>() as u64;
    let raw_v1 = read_raw::<RawV1Extra, _>(reader, v1_offset, "Boot::V2::header")?;
    let raw_v2 = read_raw::<RawV2Extra, _>(
        reader,
        v1_offset + mem::size_of::<RawV1Extra>() as u64,
        "Boot::V2::header",
    )?;
    check_header_size(raw_v1.header_size.get(), header_size, "Boot::V2::header_size");

    Ok(DecodedHeader {
        header: BootHeader::V2 {
            common,
            recovery_dtbo_size: raw_v1.recovery_dtbo_size.get(),
            recovery_dtbo_offset: raw_v1.recovery_dtbo_offset.get(),
            dtb_size: raw_v2.dtb_size.get(),
            dtb_addr: raw_v2.dtb_addr.get(),
        },
        cmdline,
    })
}

fn decode_gki(raw: &RawV3, cmdline_capacity: usize) -> (GkiFields, BString) {
    let fields = GkiFields {
        kernel_size: raw.kernel_size.get(),
        ramdisk_size: raw.ramdisk_size.get(),
        os_version: raw.os_version.get(),
    };

    let cmdline = copy_cmdline(&[&raw.cmdline], cmdline_capacity, "Boot::V3::cmdline");

    (fields, cmdline)
}

fn decode_v3<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    cmdline_capacity: usize,
) -> Result<DecodedHeader> {
    let raw = read_raw::<RawV3, _>(reader, offset, "Boot::V3::header")?;
    check_header_size(raw.header_size.get(), mem::size_of::<RawV3>(), "Boot::V3::header_size");
    let (common, cmdline) = decode_gki(&raw, cmdline_capacity);

    Ok(DecodedHeader {
        header: BootHeader::V3(common),
        cmdline,
    })
}

fn decode_v4<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    cmdline_capacity: usize,
) -> Result<DecodedHeader> {
    let raw = read_raw::<RawV3, _>(reader, offset, "Boot::V4::header")?;
    check_header_size(
        raw.header_size.get(),
        mem::size_of::<RawV3>() + mem::size_of::<RawV4Extra>(),
        "Boot::V4::header_size",
    );
    let (common, cmdline) = decode_gki(&raw, cmdline_capacity);

    let raw_v4 = read_raw::<RawV4Extra, _>(
        reader,
        offset + mem::size_of::<RawV3>() as u64,
        "Boot::V4::header",
    )?;

    Ok(DecodedHeader {
        header: BootHeader::V4 {
            common,
            signature_size: raw_v4.signature_size.get(),
        },
        cmdline,
    })
}

impl BootHeader {
    fn decode<R: ReadAt + ?Sized>(
        reader: &R,
        offset: u64,
        header_version: u32,
        cmdline_capacity: usize,
    ) -> Result<DecodedHeader> {
        match header_version {
            0 => decode_v0(reader, offset, cmdline_capacity),
            1 => decode_v1(reader, offset, cmdline_capacity),
            2 => decode_v2(reader, offset, cmdline_capacity),
            3 => decode_v3(reader, offset, cmdline_capacity),
            4 => decode_v4(reader, offset, cmdline_capacity),
            v => Err(Error::UnknownHeaderVersion(v)),
        }
    }

    pub fn header_version(&self) -> u32 {
        match self {
            Self::V0(_) => 0,
            Self::V1 { .. } => 1,
            Self::V2 { .. } => 2,
            Self::V3(_) => 3,
            Self::V4 { .. } => 4,
        }
    }

    pub fn header_size(&self) -> u32 {
        let size = match self {
            Self::V0(_) => mem::size_of::<RawV0>(),
            Self::V1 { .. } => mem::size_of::<RawV0>() + mem::size_of::<RawV1Extra>(),
            Self::V2 { .. } => {
                mem::size_of::<RawV0>()
                    + mem::size_of::<RawV1Extra>()
                    + mem::size_of::<RawV2Extra>()
            }
            Self::V3(_) => mem::size_of::<RawV3>(),
            Self::V4 { .. } => mem::size_of::<RawV3>() + mem::size_of::<RawV4Extra>(),
        };

        size as u32
    }

    pub fn page_size(&self) -> u32 {
        match self {
            Self::V0(c) | Self::V1 { common: c, .. } | Self::V2 { common: c, .. } => c.page_size,
            Self::V3(_) | Self::V4 { .. } => PAGE_SIZE,
        }
    }

    pub fn kernel_size(&self) -> u32 {
        match self {
            Self::V0(c) | Self::V1 { common: c, .. } | Self::V2 { common: c, .. } => c.kernel_size,
            Self::V3(c) | Self::V4 { common: c, .. } => c.kernel_size,
        }
    }

    pub fn ramdisk_size(&self) -> u32 {
        match self {
            Self::V0(c) | Self::V1 { common: c, .. } | Self::V2 { common: c, .. } => {
                c.ramdisk_size
            }
            Self::V3(c) | Self::V4 { common: c, .. } => c.ramdisk_size,
        }
    }

    pub fn os_version(&self) -> u32 {
        match self {
            Self::V0(c) | Self::V1 { common: c, .. } | Self::V2 { common: c, .. } => c.os_version,
            Self::V3(c) | Self::V4 { common: c, .. } => c.os_version,
        }
    }

    /// Sizes of every section after the header, in on-disk order.
    fn section_sizes(&self) -> Vec<u64> {
        let mut sizes = vec![self.kernel_size().into(), self.ramdisk_size().into()];

        match self {
            Self::V0(c) => sizes.push(c.second_size.into()),
            Self::V1 {
                common,
                recovery_dtbo_size,
                ..
            } => {
                sizes.push(common.second_size.into());
                sizes.push((*recovery_dtbo_size).into());
            }
            Self::V2 {
                common,
                recovery_dtbo_size,
                dtb_size,
                ..
            } => {
                sizes.push(common.second_size.into());
                sizes.push((*recovery_dtbo_size).into());
                sizes.push((*dtb_size).into());
            }
            Self::V3(_) => {}
            Self::V4 { signature_size, .. } => sizes.push((*signature_size).into()),
        }

        sizes
    }
}

/// Validated view of a generic boot image header and where its payload lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootImageDescriptor {
    pub header: BootHeader,
    /// Offset of the header within the reader. This is non-zero when the image
    /// is preceded by a signing envelope.
    pub payload_offset: u64,
    /// Total size of the image, including `payload_offset`.
    pub image_size: u64,
    pub kernel_cmdline: BString,
}

impl BootImageDescriptor {
    pub fn parse<R: ReadAt + ?Sized>(reader: &R, options: &ParseOptions) -> Result<Self> {
        let (offset, raw) = find_magic::<RawVersionHeader, _>(
            reader,
            options.signature_header_skip,
            BOOT_MAGIC,
            |h| h.magic,
            "Boot::version_header",
        )?;

        let header_version = raw.header_version.get();
        debug!("Found boot image v{header_version} header at offset {offset}");

        let decoded =
            BootHeader::decode(reader, offset, header_version, options.cmdline_capacity)?;
        let header = decoded.header;
        let page_size = header.page_size();

        let image_size = sections_size(&header.section_sizes(), page_size, "Boot::image_size")?
            .checked_add(page_size.into())
            .and_then(|s| s.checked_add(offset))
            .ok_or(Error::IntOverflow("Boot::image_size"))?;

        check_fit(image_size, options.capacity)?;

        Ok(Self {
            header,
            payload_offset: offset,
            image_size,
            kernel_cmdline: decoded.cmdline,
        })
    }

    pub fn header_version(&self) -> u32 {
        self.header.header_version()
    }

    pub fn page_size(&self) -> u32 {
        self.header.page_size()
    }

    pub fn kernel_size(&self) -> u32 {
        self.header.kernel_size()
    }

    pub fn ramdisk_size(&self) -> u32 {
        self.header.ramdisk_size()
    }

    /// Offset of the kernel within the reader. The header occupies the first
    /// page.
    pub fn kernel_offset(&self) -> u64 {
        self.payload_offset.saturating_add(self.page_size().into())
    }

    /// Offset of the ramdisk within the reader.
    pub fn ramdisk_offset(&self) -> u64 {
        let kernel_pages = padding::round(u64::from(self.kernel_size()), self.page_size().into())
            .unwrap_or(u64::MAX);

        self.kernel_offset().saturating_add(kernel_pages)
    }
}

impl fmt::Display for BootImageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Boot image v{} header:", self.header_version())?;
        writeln!(f, "- Payload offset:     {}", self.payload_offset)?;
        writeln!(f, "- Image size:         {}", self.image_size)?;
        writeln!(f, "- Page size:          {}", self.page_size())?;
        writeln!(f, "- Header size:        {}", self.header.header_size())?;
        writeln!(f, "- Kernel size:        {}", self.kernel_size())?;
        writeln!(f, "- Ramdisk size:       {}", self.ramdisk_size())?;
        writeln!(f, "- OS version:         {:#x}", self.header.os_version())?;

        match &self.header {
            BootHeader::V0(c) => {
                writeln!(f, "- Second stage size:  {}", c.second_size)?;
                writeln!(f, "- Name:               {:?}", c.name)?;
            }
            BootHeader::V1 {
                common,
                recovery_dtbo_size,
                recovery_dtbo_offset,
            } => {
                writeln!(f, "- Second stage size:  {}", common.second_size)?;
                writeln!(f, "- Name:               {:?}", common.name)?;
                writeln!(f, "- Recovery dtbo size: {recovery_dtbo_size}")?;
                writeln!(f, "- Recovery dtbo offs: {recovery_dtbo_offset}")?;
            }
            BootHeader::V2 {
                common,
                recovery_dtbo_size,
                recovery_dtbo_offset,
                dtb_size,
                dtb_addr,
            } => {
                writeln!(f, "- Second stage size:  {}", common.second_size)?;
                writeln!(f, "- Name:               {:?}", common.name)?;
                writeln!(f, "- Recovery dtbo size: {recovery_dtbo_size}")?;
                writeln!(f, "- Recovery dtbo offs: {recovery_dtbo_offset}")?;
                writeln!(f, "- Device tree size:   {dtb_size}")?;
                writeln!(f, "- Device tree addr:   {dtb_addr:#x}")?;
            }
            BootHeader::V3(_) => {}
            BootHeader::V4 { signature_size, .. } => {
                writeln!(f, "- Signature size:     {signature_size}")?;
            }
        }

        write!(f, "- Kernel cmdline:     {:?}", self.kernel_cmdline)
    }
}

/// Validated view of a vendor boot image header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VendorBootDescriptor {
    pub header_version: u32,
    pub page_size: u32,
    pub header_size: u32,
    pub vendor_ramdisk_size: u32,
    pub dtb_size: u32,
    /// Always zero for v3.
    pub vendor_ramdisk_table_size: u32,
    pub vendor_ramdisk_table_entry_num: u32,
    /// Always zero for v3.
    pub bootconfig_size: u32,
    pub payload_offset: u64,
    pub image_size: u64,
    pub kernel_cmdline: BString,
}

impl VendorBootDescriptor {
    pub fn parse<R: ReadAt + ?Sized>(reader: &R, options: &ParseOptions) -> Result<Self> {
        let (offset, raw) = find_magic::<RawVendorVersionHeader, _>(
            reader,
            options.signature_header_skip,
            VENDOR_BOOT_MAGIC,
            |h| h.magic,
            "Vendor::version_header",
        )?;

        let header_version = raw.header_version.get();
        debug!("Found vendor boot image v{header_version} header at offset {offset}");

        if !(3..=4).contains(&header_version) {
            return Err(Error::UnknownHeaderVersion(header_version));
        }

        let raw_v3 = read_raw::<RawVendorV3, _>(reader, offset, "Vendor::V3::header")?;

        let vendor_ramdisk_size = raw_v3.vendor_ramdisk_size.get();
        let dtb_size = raw_v3.dtb_size.get();
        let header_size = raw_v3.header_size.get();

        let mut expected_header_size = mem::size_of::<RawVendorV3>();
        let mut table_size = 0;
        let mut table_entry_num = 0;
        let mut bootconfig_size = 0;

        if header_version == 4 {
            let raw_v4 = read_raw::<RawVendorV4Extra, _>(
                reader,
                offset + mem::size_of::<RawVendorV3>() as u64,
                "Vendor::V4::header",
            )?;
            expected_header_size += mem::size_of::<RawVendorV4Extra>();

            table_size = raw_v4.vendor_ramdisk_table_size.get();
            table_entry_num = raw_v4.vendor_ramdisk_table_entry_num.get();
            let table_entry_size = raw_v4.vendor_ramdisk_table_entry_size.get();

            bootconfig_size = raw_v4.bootconfig_size.get();

            if table_entry_size != mem::size_of::<RawVendorV4RamdiskTableEntry>() as u32 {
                return Err(Error::VendorV4InvalidRamdiskEntrySize(table_entry_size));
            }

            let actual_table_size = table_entry_num
                .checked_mul(table_entry_size)
                .ok_or(Error::IntOverflow("Vendor::V4::actual_table_size"))?;
            if actual_table_size != table_size {
                return Err(Error::VendorV4InvalidRamdiskTableSize {
                    actual: actual_table_size,
                    expected: table_size,
                });
            }
        }

        check_header_size(header_size, expected_header_size, "Vendor::header_size");
        let page_size =
            check_page_size(raw_v3.page_size.get(), header_size.max(expected_header_size as u32))?;

        let image_size = sections_size(
            &[
                vendor_ramdisk_size.into(),
                dtb_size.into(),
                table_size.into(),
                bootconfig_size.into(),
            ],
            page_size,
            "Vendor::image_size",
        )?
        .checked_add(page_size.into())
        .and_then(|s| s.checked_add(offset))
        .ok_or(Error::IntOverflow("Vendor::image_size"))?;

        check_fit(image_size, options.capacity)?;

        let kernel_cmdline = copy_cmdline(
            &[&raw_v3.cmdline],
            options.cmdline_capacity,
            "Vendor::V3::cmdline",
        );

        Ok(Self {
            header_version,
            page_size,
            header_size,
            vendor_ramdisk_size,
            dtb_size,
            vendor_ramdisk_table_size: table_size,
            vendor_ramdisk_table_entry_num: table_entry_num,
            bootconfig_size,
            payload_offset: offset,
            image_size,
            kernel_cmdline,
        })
    }

    fn page_round(&self, size: u32) -> u64 {
        padding::round(u64::from(size), self.page_size.into()).unwrap_or(u64::MAX)
    }

    /// Offset of the concatenated vendor ramdisks within the reader. The
    /// header occupies the first page.
    pub fn vendor_ramdisk_offset(&self) -> u64 {
        self.payload_offset.saturating_add(self.page_size.into())
    }

    /// Offset of the bootconfig section within the reader. The section follows
    /// the vendor ramdisks, the device tree, and the ramdisk table.
    pub fn bootconfig_offset(&self) -> u64 {
        self.vendor_ramdisk_offset()
            .saturating_add(self.page_round(self.vendor_ramdisk_size))
            .saturating_add(self.page_round(self.dtb_size))
            .saturating_add(self.page_round(self.vendor_ramdisk_table_size))
    }
}

impl fmt::Display for VendorBootDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vendor boot image v{} header:", self.header_version)?;
        writeln!(f, "- Payload offset:      {}", self.payload_offset)?;
        writeln!(f, "- Image size:          {}", self.image_size)?;
        writeln!(f, "- Page size:           {}", self.page_size)?;
        writeln!(f, "- Vendor ramdisk size: {}", self.vendor_ramdisk_size)?;
        writeln!(f, "- Device tree size:    {}", self.dtb_size)?;

        if self.header_version >= 4 {
            writeln!(f, "- Ramdisk table size:  {}", self.vendor_ramdisk_table_size)?;
            writeln!(f, "- Ramdisk count:       {}", self.vendor_ramdisk_table_entry_num)?;
            writeln!(f, "- Bootconfig size:     {}", self.bootconfig_size)?;
        }

        write!(f, "- Kernel cmdline:      {:?}", self.kernel_cmdline)
    }
}

/// Validated view of an init boot image, which is a v3/v4 boot image that
/// only carries the generic ramdisk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InitBootDescriptor {
    pub header_version: u32,
    pub page_size: u32,
    pub ramdisk_size: u32,
    pub payload_offset: u64,
    pub image_size: u64,
    ramdisk_offset: u64,
}

impl InitBootDescriptor {
    pub fn parse<R: ReadAt + ?Sized>(reader: &R, options: &ParseOptions) -> Result<Self> {
        let boot = BootImageDescriptor::parse(reader, options)?;
        let header_version = boot.header_version();

        if header_version < 3 {
            return Err(Error::UnknownHeaderVersion(header_version));
        }

        if boot.kernel_size() != 0 {
            warn!(
                "Init boot image unexpectedly contains a kernel ({} bytes)",
                boot.kernel_size(),
            );
        }

        Ok(Self {
            header_version,
            page_size: boot.page_size(),
            ramdisk_size: boot.ramdisk_size(),
            payload_offset: boot.payload_offset,
            image_size: boot.image_size,
            ramdisk_offset: boot.ramdisk_offset(),
        })
    }

    /// Offset of the generic ramdisk within the reader.
    pub fn ramdisk_offset(&self) -> u64 {
        self.ramdisk_offset
    }
}

impl fmt::Display for InitBootDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Init boot image v{} header:", self.header_version)?;
        writeln!(f, "- Payload offset: {}", self.payload_offset)?;
        writeln!(f, "- Image size:     {}", self.image_size)?;
        writeln!(f, "- Page size:      {}", self.page_size)?;
        write!(f, "- Ramdisk size:   {}", self.ramdisk_size)
    }
}
