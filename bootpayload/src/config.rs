// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fs, path::Path};

use anyhow::{Context, Result};
use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::{
    cmdline::BootConfigUpdate,
    format::bootimage,
    payload::{AssemblerOptions, BootMode},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootConfigSection {
    /// Value for `androidboot.serialno`. `DummySN` selects the fallback.
    pub serialno: Option<String>,
    /// Fallback for the `DummySN` placeholder.
    pub fallback_serialno: Option<String>,
    /// Active boot chain for `androidboot.slot_suffix` (0 = a, 1 = b).
    pub boot_chain: Option<u32>,
    /// Additional raw `key=value` parameters.
    pub extra: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub signature_header_skip: u64,
    pub boot_mode: BootMode,
    pub cmdline_capacity: usize,
    pub migrate_cmdline: bool,
    pub bootconfig: BootConfigSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signature_header_skip: 0,
            boot_mode: BootMode::Normal,
            cmdline_capacity: bootimage::CMDLINE_MAX_SIZE,
            migrate_cmdline: false,
            bootconfig: BootConfigSection::default(),
        }
    }
}

impl Config {
    pub fn from_toml(data: &str) -> Result<Self> {
        toml_edit::de::from_str(data).context("Failed to parse config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data =
            fs::read_to_string(path).with_context(|| format!("Failed to read config: {path:?}"))?;

        Self::from_toml(&data).with_context(|| format!("Failed to load config: {path:?}"))
    }

    pub fn assembler_options(&self) -> AssemblerOptions {
        AssemblerOptions {
            signature_header_skip: self.signature_header_skip,
            cmdline_capacity: self.cmdline_capacity,
            boot_mode: self.boot_mode,
            migrate_cmdline: self.migrate_cmdline,
        }
    }

    /// Build the pending `androidboot.*` parameters described by the
    /// `[bootconfig]` section.
    pub fn pending_updates(&self) -> Result<BootConfigUpdate> {
        let section = &self.bootconfig;
        let mut update = BootConfigUpdate::new();

        if let Some(serialno) = &section.serialno {
            let fallback = section.fallback_serialno.as_deref().map(|s| s.as_bytes().as_bstr());

            update
                .add_serial_number(serialno.as_bytes().as_bstr(), fallback)
                .context("Failed to add serial number")?;
        }

        if let Some(boot_chain) = section.boot_chain {
            update
                .add_slot_suffix(boot_chain)
                .context("Failed to add slot suffix")?;
        }

        for line in &section.extra {
            update
                .add_raw(line.as_bytes().as_bstr())
                .with_context(|| format!("Failed to add parameter: {line:?}"))?;
        }

        Ok(update)
    }
}
