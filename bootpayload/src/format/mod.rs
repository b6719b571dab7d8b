// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

pub mod bootconfig;
pub mod bootimage;
pub mod padding;
