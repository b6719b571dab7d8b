// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Error classification shared by every module.
//!
//! Each module has its own [`thiserror`] error type with variants that say
//! exactly what went wrong. Callers that only need to decide whether to fall
//! back, skip an optional artifact, or abort the boot should match on
//! [`ErrorKind`] instead.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// An expected-absent artifact: missing partition, missing device tree
    /// property, magic mismatch, or an image that does not fit its container.
    NotFound,
    /// The caller violated the contract of the function (empty input, etc.).
    InvalidParameter,
    /// The image declares a header version that this parser does not know.
    IncompatibleVersion,
    /// The byte-range reader failed.
    DeviceError,
    /// Memory could not be reserved or a fixed-size region is full.
    OutOfResources,
}

impl ErrorKind {
    /// Whether the error means "the artifact is not there" and the caller
    /// should continue without it.
    pub fn is_absent(self) -> bool {
        matches!(self, Self::NotFound | Self::IncompatibleVersion)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::InvalidParameter => "invalid parameter",
            Self::IncompatibleVersion => "incompatible version",
            Self::DeviceError => "device error",
            Self::OutOfResources => "out of resources",
        };

        f.write_str(s)
    }
}
