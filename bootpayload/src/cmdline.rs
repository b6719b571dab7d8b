// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Pending `androidboot.*` bootconfig parameters.
//!
//! Older bootloaders pass `androidboot.*` options on the kernel command line.
//! With bootconfig, the kernel expects them in the bootconfig region instead,
//! so [`migrate_androidboot_args`] moves them into a [`BootConfigSink`],
//! usually a [`BootConfigUpdate`].

use bstr::{BStr, BString, ByteSlice};
use memchr::memmem;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorKind;

pub const ANDROIDBOOT_PREFIX: &[u8] = b"androidboot.";

/// Longest key that is migrated. Longer keys are truncated.
pub const MAX_KEY_LEN: usize = 31;
/// Longest value that is migrated. Longer values are truncated.
pub const MAX_VALUE_LEN: usize = 255;

/// Capacity of the pending parameter text.
pub const BOOTCONFIG_MAX_LEN: usize = 1024;

pub const DUMMY_SERIALNO: &[u8] = b"DummySN";
pub const DEFAULT_SERIALNO: &[u8] = b"0123456789ABCDEF";

const SLOT_SUFFIXES: [&[u8]; 2] = [b"_a", b"_b"];

#[derive(Debug, Error)]
pub enum Error {
    #[error("Parameter {line:?} does not fit: {len} of {max} bytes used")]
    NoSpace { line: BString, len: usize, max: usize },
    #[error("Invalid boot chain: {0}")]
    InvalidBootChain(u32),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSpace { .. } => ErrorKind::OutOfResources,
            Self::InvalidBootChain(_) => ErrorKind::InvalidParameter,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Receiver of `androidboot.<key>=<value>` parameters.
pub trait BootConfigSink {
    /// Record `androidboot.<key>=<value>`. The key does not include the
    /// `androidboot.` prefix.
    fn update(&mut self, key: &BStr, value: &BStr) -> Result<()>;
}

impl<F: FnMut(&BStr, &BStr) -> Result<()>> BootConfigSink for F {
    fn update(&mut self, key: &BStr, value: &BStr) -> Result<()> {
        self(key, value)
    }
}

fn truncate<'a>(data: &'a [u8], max: usize, field: &str) -> &'a [u8] {
    if data.len() > max {
        warn!(
            "Truncating {field} {:?} from {} to {max} bytes",
            data.as_bstr(),
            data.len(),
        );
        &data[..max]
    } else {
        data
    }
}

/// Copy every `androidboot.<key>=<value>` token from the kernel command line
/// to `sink`, in order. The prefix is matched anywhere, not only at the start
/// of a space-delimited token. The first sink error stops the scan, but
/// parameters that were already recorded are kept.
pub fn migrate_androidboot_args(
    cmdline: Option<&[u8]>,
    sink: &mut (impl BootConfigSink + ?Sized),
) -> Result<()> {
    let Some(mut rest) = cmdline else {
        return Ok(());
    };

    while let Some(pos) = memmem::find(rest, ANDROIDBOOT_PREFIX) {
        let after = &rest[pos + ANDROIDBOOT_PREFIX.len()..];

        let Some(eq) = memchr::memchr(b'=', after) else {
            debug!("No value after trailing {:?}", after.as_bstr());
            break;
        };

        let key = truncate(&after[..eq], MAX_KEY_LEN, "key");

        let value_start = &after[eq + 1..];
        let value_len = memchr::memchr(b' ', value_start).unwrap_or(value_start.len());
        let value = truncate(&value_start[..value_len], MAX_VALUE_LEN, "value");

        debug!(
            "Migrating androidboot.{}={}",
            key.as_bstr(),
            value.as_bstr(),
        );
        sink.update(key.as_bstr(), value.as_bstr())?;

        rest = &value_start[value_len..];
    }

    Ok(())
}

/// Bounded text buffer of pending `androidboot.*` lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootConfigUpdate {
    text: BString,
}

impl BootConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Add `androidboot.serialno`. The placeholder [`DUMMY_SERIALNO`] is
    /// replaced by `fallback`, or [`DEFAULT_SERIALNO`] if there is none.
    /// Returns the serial number that was recorded.
    pub fn add_serial_number(&mut self, value: &BStr, fallback: Option<&BStr>) -> Result<BString> {
        let value = if value == DUMMY_SERIALNO {
            match fallback {
                Some(f) => f,
                None => {
                    warn!("No fallback serial number; using default");
                    DEFAULT_SERIALNO.as_bstr()
                }
            }
        } else {
            value
        };

        self.update(b"serialno".as_bstr(), value)?;

        Ok(value.to_owned())
    }

    /// Add `androidboot.slot_suffix` for the active boot chain.
    pub fn add_slot_suffix(&mut self, boot_chain: u32) -> Result<()> {
        let suffix = usize::try_from(boot_chain)
            .ok()
            .and_then(|i| SLOT_SUFFIXES.get(i))
            .ok_or(Error::InvalidBootChain(boot_chain))?;

        self.update(b"slot_suffix".as_bstr(), suffix.as_bstr())
    }

    /// Add a raw `key=value` line, where `key` includes any prefix.
    pub fn add_raw(&mut self, line: &BStr) -> Result<()> {
        let mut line = BString::from(line.trim_end_with(|c| c == '\n'));
        line.push(b'\n');

        self.push_line(line)
    }

    fn push_line(&mut self, line: BString) -> Result<()> {
        if self.text.len() + line.len() > BOOTCONFIG_MAX_LEN {
            return Err(Error::NoSpace {
                line,
                len: self.text.len(),
                max: BOOTCONFIG_MAX_LEN,
            });
        }

        self.text.extend_from_slice(&line);

        Ok(())
    }
}

impl BootConfigSink for BootConfigUpdate {
    fn update(&mut self, key: &BStr, value: &BStr) -> Result<()> {
        let mut line = BString::from(ANDROIDBOOT_PREFIX);
        line.extend_from_slice(key);
        line.push(b'=');
        line.extend_from_slice(value);
        line.push(b'\n');

        self.push_line(line)
    }
}
