// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Bootconfig parameter regions.
//!
//! A bootconfig region is a run of `key=value\n` lines followed by a 20-byte
//! trailer that the kernel uses to find and verify the parameters:
//!
//! ```text
//! offset 0:  params_size (u32, little endian)
//! offset 4:  checksum    (u32, little endian)
//! offset 8:  "#BOOTCONFIG\n"
//! ```
//!
//! A region contains zero or one trailer, and it is always at the end. Adding
//! parameters to a region that already has a trailer reclaims the old trailer
//! first.

use std::mem;

use thiserror::Error;
use tracing::{trace, warn};
use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::ErrorKind;

pub const BOOTCONFIG_MAGIC: [u8; 12] = *b"#BOOTCONFIG\n";
pub const TRAILER_SIZE: usize = mem::size_of::<RawTrailer>();

#[derive(Debug, Error)]
pub enum Error {
    #[error("Bootconfig region is empty")]
    EmptyRegion,
    #[error("No parameters to append")]
    EmptyParams,
    #[error("Parameter size must be non-zero")]
    ZeroSize,
    #[error("Size {size} is beyond the end of the region ({len} bytes)")]
    SizeOutOfRange { size: usize, len: usize },
    #[error("Trailer claims {claimed} parameter bytes, but only {available} precede it")]
    InvalidTrailerSize { claimed: u32, available: usize },
    #[error("No trailer ends at offset {0}")]
    TrailerNotFound(usize),
    #[error("Expected checksum {expected:#010x}, but have {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("Need {needed} bytes, but region only has {available} bytes")]
    NoSpace { needed: usize, available: usize },
    #[error("Parameter size does not fit in a trailer: {0}")]
    ParamsTooLarge(usize),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyRegion
            | Self::EmptyParams
            | Self::ZeroSize
            | Self::SizeOutOfRange { .. }
            | Self::InvalidTrailerSize { .. } => ErrorKind::InvalidParameter,
            Self::TrailerNotFound(_) | Self::ChecksumMismatch { .. } => ErrorKind::NotFound,
            Self::NoSpace { .. } | Self::ParamsTooLarge(_) => ErrorKind::OutOfResources,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout for the trailer.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawTrailer {
    params_size: little_endian::U32,
    checksum: little_endian::U32,
    /// Magic value. This should be equal to [`BOOTCONFIG_MAGIC`].
    magic: [u8; 12],
}

/// Sum of every byte, wrapping on overflow. This is what the kernel uses to
/// validate the parameters.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |sum, b| sum.wrapping_add((*b).into()))
}

/// Whether the bytes immediately before `end` are the trailer magic.
pub fn has_trailer(region: &[u8], end: usize) -> bool {
    end >= BOOTCONFIG_MAGIC.len()
        && end <= region.len()
        && region[end - BOOTCONFIG_MAGIC.len()..end] == BOOTCONFIG_MAGIC
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Trailer {
    pub params_size: u32,
    pub checksum: u32,
}

impl Trailer {
    /// Compute the trailer for the specified parameter bytes.
    pub fn new(params: &[u8]) -> Result<Self> {
        let params_size =
            u32::try_from(params.len()).map_err(|_| Error::ParamsTooLarge(params.len()))?;

        Ok(Self {
            params_size,
            checksum: checksum(params),
        })
    }

    /// Decode the trailer that ends at `end`.
    pub fn read(region: &[u8], end: usize) -> Result<Self> {
        if end > region.len() {
            return Err(Error::SizeOutOfRange {
                size: end,
                len: region.len(),
            });
        } else if end < TRAILER_SIZE || !has_trailer(region, end) {
            return Err(Error::TrailerNotFound(end));
        }

        let raw = RawTrailer::read_from_bytes(&region[end - TRAILER_SIZE..end])
            .map_err(|_| Error::TrailerNotFound(end))?;

        Ok(Self {
            params_size: raw.params_size.get(),
            checksum: raw.checksum.get(),
        })
    }

    /// Decode the trailer ending at `end` and verify that it describes the
    /// bytes in front of it.
    pub fn verify(region: &[u8], end: usize) -> Result<Self> {
        let trailer = Self::read(region, end)?;
        let params = trailer.params(region, end)?;

        let actual = checksum(params);
        if actual != trailer.checksum {
            return Err(Error::ChecksumMismatch {
                expected: trailer.checksum,
                actual,
            });
        }

        Ok(trailer)
    }

    /// Get the parameter bytes covered by this trailer, which ends at `end`.
    pub fn params<'a>(&self, region: &'a [u8], end: usize) -> Result<&'a [u8]> {
        let available = end.saturating_sub(TRAILER_SIZE);
        let size = self.params_size as usize;

        if size > available {
            return Err(Error::InvalidTrailerSize {
                claimed: self.params_size,
                available,
            });
        }

        Ok(&region[..size])
    }

    fn to_bytes(self) -> [u8; TRAILER_SIZE] {
        let raw = RawTrailer {
            params_size: self.params_size.into(),
            checksum: self.checksum.into(),
            magic: BOOTCONFIG_MAGIC,
        };

        let mut buf = [0u8; TRAILER_SIZE];
        buf.copy_from_slice(raw.as_bytes());
        buf
    }
}

/// Write a trailer for the first `size` bytes of `region` at offset `size`.
/// Returns the number of bytes written, which is zero if the trailer is
/// already present. Calling this repeatedly with the same inputs only writes
/// once.
pub fn add_trailer(region: &mut [u8], size: usize) -> Result<usize> {
    if region.is_empty() {
        return Err(Error::EmptyRegion);
    } else if size == 0 {
        return Err(Error::ZeroSize);
    } else if size > region.len() {
        return Err(Error::SizeOutOfRange {
            size,
            len: region.len(),
        });
    }

    if has_trailer(region, size) {
        trace!("Trailer already ends at offset {size}");
        return Ok(0);
    }

    let trailer = Trailer::new(&region[..size])?;
    let end = size + TRAILER_SIZE;

    if end > region.len() {
        return Err(Error::NoSpace {
            needed: end,
            available: region.len(),
        });
    }

    if Trailer::read(region, end).is_ok_and(|t| t == trailer) {
        trace!("Trailer for {size} bytes is already present");
        return Ok(0);
    }

    region[size..end].copy_from_slice(&trailer.to_bytes());

    Ok(TRAILER_SIZE)
}

/// Result of [`append_params`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Applied {
    /// Number of bytes written, including the new trailer.
    pub written: usize,
    /// Size of the region's live contents, including the new trailer.
    pub size: usize,
}

/// Append `params` to a region whose first `current_size` bytes are in use.
/// If the used bytes end with a trailer, the trailer is removed, the previous
/// parameter size is taken from it, and a new trailer covering both the old
/// and new parameters is written.
pub fn append_params(params: &[u8], region: &mut [u8], current_size: usize) -> Result<Applied> {
    if params.is_empty() {
        return Err(Error::EmptyParams);
    } else if region.is_empty() {
        return Err(Error::EmptyRegion);
    } else if current_size > region.len() {
        return Err(Error::SizeOutOfRange {
            size: current_size,
            len: region.len(),
        });
    }

    let mut params_start = current_size;

    if has_trailer(region, current_size) {
        let trailer = Trailer::read(region, current_size)?;
        let available = current_size.saturating_sub(TRAILER_SIZE);

        if trailer.params_size as usize > available {
            return Err(Error::InvalidTrailerSize {
                claimed: trailer.params_size,
                available,
            });
        }

        trace!(
            "Reclaiming trailer for {} bytes at offset {available}",
            trailer.params_size,
        );
        params_start = trailer.params_size as usize;
    }

    let new_size = params_start
        .checked_add(params.len())
        .filter(|s| *s <= region.len())
        .ok_or(Error::NoSpace {
            needed: params_start.saturating_add(params.len()),
            available: region.len(),
        })?;

    region[params_start..new_size].copy_from_slice(params);

    let trailer_size = match add_trailer(region, new_size) {
        Ok(n) => n,
        Err(e) => {
            warn!("Failed to add bootconfig trailer: {e}");
            0
        }
    };

    Ok(Applied {
        written: params.len() + trailer_size,
        size: new_size + trailer_size,
    })
}
