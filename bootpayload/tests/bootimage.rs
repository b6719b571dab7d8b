// SPDX-FileCopyrightText: 2023-2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

mod common;

use assert_matches::assert_matches;
use bootpayload::{
    error::ErrorKind,
    format::bootimage::{
        BootHeader, BootImageDescriptor, Capacity, Error, InitBootDescriptor, ParseOptions,
        VendorBootDescriptor, check_fit,
    },
    stream::MemoryRegion,
};

use common::{GkiImage, LegacyImage, VendorImage, reader, repeat, with_envelope};

fn bounded(data: &[u8]) -> ParseOptions {
    ParseOptions {
        capacity: Capacity::Bounded(data.len() as u64),
        ..Default::default()
    }
}

#[test]
fn v0_minimal_layout() {
    let image = LegacyImage::default().build();
    assert_eq!(image.len(), 14336);

    let d = BootImageDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();

    assert_eq!(d.header_version(), 0);
    assert_eq!(d.payload_offset, 0);
    assert_eq!(d.page_size(), 2048);
    assert_eq!(d.kernel_size(), 8192);
    assert_eq!(d.ramdisk_size(), 4096);
    assert_eq!(d.image_size, 14336);
    assert_eq!(d.kernel_offset(), 2048);
    assert_eq!(d.ramdisk_offset(), 2048 + 8192);
    assert!(check_fit(d.image_size, Capacity::Bounded(14336)).is_ok());
}

#[test]
fn v0_exceeds_capacity() {
    let image = LegacyImage::default().build();
    let options = ParseOptions {
        capacity: Capacity::Bounded(14335),
        ..Default::default()
    };

    let err = BootImageDescriptor::parse(&reader(image), &options).unwrap_err();
    assert_matches!(
        err,
        Error::ExceedsCapacity {
            image_size: 14336,
            capacity: 14335,
        }
    );
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn v0_cmdline_concatenation() {
    let image = LegacyImage {
        cmdline: "console=ttyS0 androidboot.mode=normal".into(),
        extra_cmdline: " quiet".into(),
        ..Default::default()
    }
    .build();

    let d = BootImageDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap();
    assert_eq!(d.kernel_cmdline, "console=ttyS0 androidboot.mode=normal quiet");
}

#[test]
fn v0_full_cmdline_fields() {
    let cmdline = repeat("Cmdline", 512);
    let extra_cmdline = repeat("ExtraCmdline", 1024);
    let image = LegacyImage {
        cmdline: cmdline.clone(),
        extra_cmdline: extra_cmdline.clone(),
        ..Default::default()
    }
    .build();

    let d = BootImageDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap();
    assert_eq!(d.kernel_cmdline, format!("{cmdline}{extra_cmdline}"));
}

#[test]
fn cmdline_truncated_to_capacity() {
    let image = LegacyImage {
        cmdline: "0123456789".into(),
        ..Default::default()
    }
    .build();
    let options = ParseOptions {
        cmdline_capacity: 4,
        ..Default::default()
    };

    let d = BootImageDescriptor::parse(&reader(image), &options).unwrap();
    assert_eq!(d.kernel_cmdline, "0123");
}

#[test]
fn v1_fields() {
    let image = LegacyImage {
        header_version: 1,
        page_size: 4096,
        second: vec![0x77; 10],
        recovery_dtbo: vec![0x88; 5000],
        ..Default::default()
    }
    .build();

    let d = BootImageDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();

    assert_matches!(
        &d.header,
        BootHeader::V1 {
            common,
            recovery_dtbo_size: 5000,
            recovery_dtbo_offset: 0x4000,
        } if common.second_size == 10 && common.name == "test"
    );
    assert_eq!(d.image_size, image.len() as u64);
    assert_eq!(d.image_size, 4096 * 7);
}

#[test]
fn v2_fields() {
    let image = LegacyImage {
        header_version: 2,
        page_size: 4096,
        dtb: vec![0x99; 4097],
        ..Default::default()
    }
    .build();

    let d = BootImageDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();

    assert_matches!(
        d.header,
        BootHeader::V2 {
            recovery_dtbo_size: 0,
            dtb_size: 4097,
            dtb_addr: 0x1f00_0000,
            ..
        }
    );
    assert_eq!(d.header.os_version(), 0x1600_0000);
    assert_eq!(d.image_size, image.len() as u64);
}

#[test]
fn v1_header_size_field_is_ignored() {
    let mut image = LegacyImage {
        header_version: 1,
        ..Default::default()
    }
    .build();
    image[1644..1648].copy_from_slice(&1000u32.to_le_bytes());

    let d = BootImageDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();
    assert_eq!(d.kernel_offset(), 2048);
    assert_eq!(d.image_size, image.len() as u64);
}

#[test]
fn large_kernel_in_resident_image() {
    let mut image = GkiImage {
        header_version: 3,
        ..Default::default()
    }
    .build();
    image[8..12].copy_from_slice(&(65 * 1024 * 1024u32).to_le_bytes());

    let region = MemoryRegion::new(image.as_slice());
    let d = BootImageDescriptor::parse(&region, &ParseOptions::default()).unwrap();

    assert_eq!(d.kernel_size(), 65 * 1024 * 1024);
    assert_eq!(d.ramdisk_offset(), 4096 + 65 * 1024 * 1024);

    let err = BootImageDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap_err();
    assert_matches!(err, Error::ExceedsCapacity { .. });
}

#[test]
fn v3_fields() {
    let image = GkiImage {
        header_version: 3,
        cmdline: "androidboot.serialno=ABC123".into(),
        ..Default::default()
    }
    .build();

    let d = BootImageDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();

    assert_matches!(d.header, BootHeader::V3(_));
    assert_eq!(d.page_size(), 4096);
    assert_eq!(d.kernel_size(), 10000);
    assert_eq!(d.ramdisk_size(), 5000);
    assert_eq!(d.kernel_offset(), 4096);
    assert_eq!(d.ramdisk_offset(), 4096 * 4);
    assert_eq!(d.kernel_cmdline, "androidboot.serialno=ABC123");
    assert_eq!(d.image_size, 4096 * 6);
}

#[test]
fn v4_fields() {
    let image = GkiImage {
        signature: vec![0xaa; 100],
        ..Default::default()
    }
    .build();

    let d = BootImageDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();

    assert_matches!(
        d.header,
        BootHeader::V4 {
            signature_size: 100,
            ..
        }
    );
    assert_eq!(d.image_size, 4096 * 7);
    assert_eq!(d.image_size, image.len() as u64);
}

#[test]
fn signature_header_skip() {
    let image = with_envelope(4096, &LegacyImage::default().build());
    let options = ParseOptions {
        signature_header_skip: 4096,
        ..bounded(&image)
    };

    let d = BootImageDescriptor::parse(&reader(image), &options).unwrap();
    assert_eq!(d.payload_offset, 4096);
    assert_eq!(d.kernel_offset(), 4096 + 2048);
    assert_eq!(d.image_size, 4096 + 14336);
}

#[test]
fn magic_not_found() {
    let image = with_envelope(4096, &LegacyImage::default().build());

    let err = BootImageDescriptor::parse(&reader(image.clone()), &ParseOptions::default())
        .unwrap_err();
    assert_matches!(err, Error::MagicNotFound(_, 0));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let options = ParseOptions {
        signature_header_skip: 2048,
        ..Default::default()
    };
    let err = BootImageDescriptor::parse(&reader(image), &options).unwrap_err();
    assert_matches!(err, Error::MagicNotFound(_, 2048));
}

#[test]
fn invalid_page_size() {
    let image = LegacyImage {
        page_size: 3000,
        ..Default::default()
    }
    .build();

    let err = BootImageDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap_err();
    assert_matches!(
        err,
        Error::InvalidPageSize {
            page_size: 3000,
            header_size: 1632,
        }
    );
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn page_size_smaller_than_header() {
    let image = LegacyImage {
        page_size: 0x10,
        kernel: vec![],
        ramdisk: vec![],
        ..Default::default()
    }
    .build();
    let options = ParseOptions {
        capacity: Capacity::Bounded(64 * 1024 * 1024),
        ..Default::default()
    };

    let err = BootImageDescriptor::parse(&reader(image), &options).unwrap_err();
    assert_matches!(err, Error::InvalidPageSize { page_size: 0x10, .. });
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let image = LegacyImage {
        header_version: 2,
        page_size: 1024,
        ..Default::default()
    }
    .build();

    let err = BootImageDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap_err();
    assert_matches!(
        err,
        Error::InvalidPageSize {
            page_size: 1024,
            header_size: 1660,
        }
    );
}

#[test]
fn unknown_version() {
    let mut image = GkiImage::default().build();
    image[40..44].copy_from_slice(&5u32.to_le_bytes());

    let err = BootImageDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap_err();
    assert_matches!(err, Error::UnknownHeaderVersion(5));
    assert_eq!(err.kind(), ErrorKind::IncompatibleVersion);
}

#[test]
fn truncated_header() {
    let image = LegacyImage::default().build();

    let err =
        BootImageDescriptor::parse(&reader(image[..100].to_vec()), &ParseOptions::default())
            .unwrap_err();
    assert_matches!(err, Error::DataRead(_, _));
    assert_eq!(err.kind(), ErrorKind::DeviceError);
}

#[test]
fn memory_resident_image() {
    let image = GkiImage::default().build();
    let region = MemoryRegion::new(image.as_slice());

    let d = BootImageDescriptor::parse(&region, &ParseOptions::default()).unwrap();
    assert_eq!(d.header_version(), 4);
}

#[test]
fn vendor_v3() {
    let image = VendorImage {
        header_version: 3,
        cmdline: "androidboot.console=ttyS0".into(),
        ..Default::default()
    }
    .build();

    let d = VendorBootDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();

    assert_eq!(d.header_version, 3);
    assert_eq!(d.page_size, 4096);
    assert_eq!(d.vendor_ramdisk_size, 3000);
    assert_eq!(d.dtb_size, 100);
    assert_eq!(d.vendor_ramdisk_table_size, 0);
    assert_eq!(d.bootconfig_size, 0);
    assert_eq!(d.kernel_cmdline, "androidboot.console=ttyS0");
    assert_eq!(d.vendor_ramdisk_offset(), 4096);
    assert_eq!(d.image_size, 4096 * 3);
}

#[test]
fn vendor_v4() {
    let vendor = VendorImage {
        bootconfig: b"androidboot.hardware=test\n".repeat(100),
        ..Default::default()
    };
    let image = vendor.build();

    let d = VendorBootDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();

    assert_eq!(d.header_version, 4);
    assert_eq!(d.vendor_ramdisk_table_size, 108);
    assert_eq!(d.vendor_ramdisk_table_entry_num, 1);
    assert_eq!(d.bootconfig_size, vendor.bootconfig.len() as u32);
    assert_eq!(d.vendor_ramdisk_offset(), 4096);
    assert_eq!(d.bootconfig_offset(), 4096 * 4);
    assert_eq!(d.image_size, image.len() as u64);

    let offset = d.bootconfig_offset() as usize;
    assert_eq!(
        &image[offset..offset + vendor.bootconfig.len()],
        vendor.bootconfig.as_slice(),
    );
}

#[test]
fn vendor_page_size_smaller_than_header() {
    let image = VendorImage {
        page_size: 2048,
        ..Default::default()
    }
    .build();

    let err =
        VendorBootDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap_err();
    assert_matches!(
        err,
        Error::InvalidPageSize {
            page_size: 2048,
            header_size: 2128,
        }
    );
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn vendor_v4_bad_table() {
    let image = VendorImage {
        table_entry_size: 100,
        ..Default::default()
    }
    .build();

    let err =
        VendorBootDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap_err();
    assert_matches!(err, Error::VendorV4InvalidRamdiskEntrySize(100));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn vendor_signature_header_skip() {
    let image = with_envelope(512, &VendorImage::default().build());
    let options = ParseOptions {
        signature_header_skip: 512,
        ..Default::default()
    };

    let d = VendorBootDescriptor::parse(&reader(image), &options).unwrap();
    assert_eq!(d.payload_offset, 512);
    assert_eq!(d.vendor_ramdisk_offset(), 512 + 4096);
}

#[test]
fn vendor_rejects_boot_image() {
    let image = GkiImage::default().build();

    let err =
        VendorBootDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap_err();
    assert_matches!(err, Error::MagicNotFound(_, _));
}

#[test]
fn init_boot() {
    let image = GkiImage::init_boot(vec![0xbb; 6000]).build();

    let d = InitBootDescriptor::parse(&reader(image.clone()), &bounded(&image)).unwrap();

    assert_eq!(d.header_version, 4);
    assert_eq!(d.page_size, 4096);
    assert_eq!(d.ramdisk_size, 6000);
    assert_eq!(d.ramdisk_offset(), 4096);
    assert_eq!(d.image_size, 4096 * 3);
}

#[test]
fn init_boot_rejects_legacy() {
    let image = LegacyImage {
        header_version: 2,
        ..Default::default()
    }
    .build();

    let err = InitBootDescriptor::parse(&reader(image), &ParseOptions::default()).unwrap_err();
    assert_matches!(err, Error::UnknownHeaderVersion(2));
    assert!(err.kind().is_absent());
}
