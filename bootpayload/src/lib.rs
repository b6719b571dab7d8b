// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Since bootpayload is primarily an application and not a library, the semver
//! versioning covers the CLI only. All Rust APIs can change at any time, even
//! in patch releases.
//!
//! The CLI source files use concrete types wherever possible for simplicity,
//! while the "library"-style source files aim to be generic over [`stream::ReadAt`]
//! so that they work the same on partitions, files, and memory regions.

pub mod cli;
pub mod cmdline;
pub mod config;
pub mod error;
pub mod format;
pub mod payload;
pub mod stream;
