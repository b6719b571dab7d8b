// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Builders for boot images with known field values. Each test file only uses
//! some of these.

#![allow(dead_code)]

use std::io::Cursor;

use bootpayload::stream::MutexFile;

pub const VENDOR_RAMDISK_TABLE_ENTRY_SIZE: u32 = 108;

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_str(buf: &mut [u8], offset: usize, max: usize, value: &str) {
    let n = value.len().min(max);
    buf[offset..offset + n].copy_from_slice(&value.as_bytes()[..n]);
}

/// Append `data` and zero pad to the next page boundary.
fn push_section(image: &mut Vec<u8>, data: &[u8], page_size: usize) {
    image.extend_from_slice(data);
    let remain = image.len() % page_size;
    if remain != 0 {
        image.resize(image.len() + page_size - remain, 0);
    }
}

pub fn repeat(s: &str, max_len: usize) -> String {
    assert!(!s.is_empty());

    let mut result = s.repeat(max_len / s.len());
    result.push_str(&s[..max_len % s.len()]);

    result
}

pub fn reader(data: Vec<u8>) -> MutexFile<Cursor<Vec<u8>>> {
    MutexFile::new(Cursor::new(data))
}

/// Prepend a signing envelope of `skip` bytes.
pub fn with_envelope(skip: usize, image: &[u8]) -> Vec<u8> {
    let mut data = vec![0xa5u8; skip];
    data.extend_from_slice(image);
    data
}

/// Boot image with a v0, v1, or v2 header.
#[derive(Clone, Debug)]
pub struct LegacyImage {
    pub header_version: u32,
    pub page_size: u32,
    pub os_version: u32,
    pub name: String,
    pub cmdline: String,
    pub extra_cmdline: String,
    pub kernel: Vec<u8>,
    pub ramdisk: Vec<u8>,
    pub second: Vec<u8>,
    pub recovery_dtbo: Vec<u8>,
    pub dtb: Vec<u8>,
}

impl Default for LegacyImage {
    fn default() -> Self {
        Self {
            header_version: 0,
            page_size: 2048,
            os_version: 0x1600_0000,
            name: "test".into(),
            cmdline: String::new(),
            extra_cmdline: String::new(),
            kernel: vec![0x11; 8192],
            ramdisk: vec![0x22; 4096],
            second: vec![],
            recovery_dtbo: vec![],
            dtb: vec![],
        }
    }
}

impl LegacyImage {
    pub fn header_size(&self) -> usize {
        match self.header_version {
            0 => 1632,
            1 => 1648,
            _ => 1660,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let page_size = self.page_size as usize;
        let mut header = vec![0u8; self.header_size()];

        header[..8].copy_from_slice(b"ANDROID!");
        put_u32(&mut header, 8, self.kernel.len() as u32);
        put_u32(&mut header, 12, 0x1000_8000);
        put_u32(&mut header, 16, self.ramdisk.len() as u32);
        put_u32(&mut header, 20, 0x1100_0000);
        put_u32(&mut header, 24, self.second.len() as u32);
        put_u32(&mut header, 28, 0x10f0_0000);
        put_u32(&mut header, 32, 0x1000_0100);
        put_u32(&mut header, 36, self.page_size);
        put_u32(&mut header, 40, self.header_version);
        put_u32(&mut header, 44, self.os_version);
        put_str(&mut header, 48, 16, &self.name);
        put_str(&mut header, 64, 512, &self.cmdline);
        put_str(&mut header, 608, 1024, &self.extra_cmdline);

        if self.header_version >= 1 {
            put_u32(&mut header, 1632, self.recovery_dtbo.len() as u32);
            put_u64(&mut header, 1636, 0x4000);
            put_u32(&mut header, 1644, self.header_size() as u32);
        }
        if self.header_version >= 2 {
            put_u32(&mut header, 1648, self.dtb.len() as u32);
            put_u64(&mut header, 1652, 0x1f00_0000);
        }

        let mut image = Vec::new();
        push_section(&mut image, &header, page_size);
        push_section(&mut image, &self.kernel, page_size);
        push_section(&mut image, &self.ramdisk, page_size);
        push_section(&mut image, &self.second, page_size);
        if self.header_version >= 1 {
            push_section(&mut image, &self.recovery_dtbo, page_size);
        }
        if self.header_version >= 2 {
            push_section(&mut image, &self.dtb, page_size);
        }

        image
    }
}

/// Boot or init boot image with a v3 or v4 header.
#[derive(Clone, Debug)]
pub struct GkiImage {
    pub header_version: u32,
    pub os_version: u32,
    pub cmdline: String,
    pub kernel: Vec<u8>,
    pub ramdisk: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Default for GkiImage {
    fn default() -> Self {
        Self {
            header_version: 4,
            os_version: 0x1800_0000,
            cmdline: String::new(),
            kernel: vec![0x33; 10000],
            ramdisk: vec![0x44; 5000],
            signature: vec![],
        }
    }
}

impl GkiImage {
    /// Init boot images only have a generic ramdisk.
    pub fn init_boot(ramdisk: Vec<u8>) -> Self {
        Self {
            kernel: vec![],
            ramdisk,
            ..Default::default()
        }
    }

    pub fn header_size(&self) -> usize {
        if self.header_version == 3 { 1580 } else { 1584 }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut header = vec![0u8; self.header_size()];

        header[..8].copy_from_slice(b"ANDROID!");
        put_u32(&mut header, 8, self.kernel.len() as u32);
        put_u32(&mut header, 12, self.ramdisk.len() as u32);
        put_u32(&mut header, 16, self.os_version);
        put_u32(&mut header, 20, self.header_size() as u32);
        put_u32(&mut header, 40, self.header_version);
        put_str(&mut header, 44, 1536, &self.cmdline);

        if self.header_version >= 4 {
            put_u32(&mut header, 1580, self.signature.len() as u32);
        }

        let mut image = Vec::new();
        push_section(&mut image, &header, 4096);
        push_section(&mut image, &self.kernel, 4096);
        push_section(&mut image, &self.ramdisk, 4096);
        if self.header_version >= 4 {
            push_section(&mut image, &self.signature, 4096);
        }

        image
    }
}

/// Vendor boot image with a v3 or v4 header.
#[derive(Clone, Debug)]
pub struct VendorImage {
    pub header_version: u32,
    pub page_size: u32,
    pub cmdline: String,
    pub vendor_ramdisk: Vec<u8>,
    pub dtb: Vec<u8>,
    pub table_entries: u32,
    pub table_entry_size: u32,
    pub bootconfig: Vec<u8>,
}

impl Default for VendorImage {
    fn default() -> Self {
        Self {
            header_version: 4,
            page_size: 4096,
            cmdline: String::new(),
            vendor_ramdisk: vec![0x55; 3000],
            dtb: vec![0x66; 100],
            table_entries: 1,
            table_entry_size: VENDOR_RAMDISK_TABLE_ENTRY_SIZE,
            bootconfig: b"androidboot.hardware=test\n".to_vec(),
        }
    }
}

impl VendorImage {
    pub fn header_size(&self) -> usize {
        if self.header_version == 3 { 2112 } else { 2128 }
    }

    pub fn build(&self) -> Vec<u8> {
        let page_size = self.page_size as usize;
        let mut header = vec![0u8; self.header_size()];

        header[..8].copy_from_slice(b"VNDRBOOT");
        put_u32(&mut header, 8, self.header_version);
        put_u32(&mut header, 12, self.page_size);
        put_u32(&mut header, 16, 0x1000_8000);
        put_u32(&mut header, 20, 0x1100_0000);
        put_u32(&mut header, 24, self.vendor_ramdisk.len() as u32);
        put_str(&mut header, 28, 2048, &self.cmdline);
        put_u32(&mut header, 2076, 0x1000_0100);
        put_str(&mut header, 2080, 16, "vendor");
        put_u32(&mut header, 2096, self.header_size() as u32);
        put_u32(&mut header, 2100, self.dtb.len() as u32);
        put_u64(&mut header, 2104, 0x1f00_0000);

        let table_size = self.table_entries * VENDOR_RAMDISK_TABLE_ENTRY_SIZE;

        if self.header_version >= 4 {
            put_u32(&mut header, 2112, table_size);
            put_u32(&mut header, 2116, self.table_entries);
            put_u32(&mut header, 2120, self.table_entry_size);
            put_u32(&mut header, 2124, self.bootconfig.len() as u32);
        }

        let mut image = Vec::new();
        push_section(&mut image, &header, page_size);
        push_section(&mut image, &self.vendor_ramdisk, page_size);
        push_section(&mut image, &self.dtb, page_size);
        if self.header_version >= 4 {
            push_section(&mut image, &vec![0u8; table_size as usize], page_size);
            push_section(&mut image, &self.bootconfig, page_size);
        }

        image
    }
}
