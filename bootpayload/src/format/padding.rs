// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use num_traits::PrimInt;

/// Calculate the amount of padding that needs to be added to align the
/// specified offset to a page boundary.
pub fn calc<N: PrimInt>(offset: N, page_size: N) -> N {
    let r = offset % page_size;
    if r == N::zero() {
        N::zero()
    } else {
        page_size - r
    }
}

/// Round to the next multiple of the page size.
pub fn round<N: PrimInt>(offset: N, page_size: N) -> Option<N> {
    let remain = calc(offset, page_size);
    offset.checked_add(&remain)
}

/// Whether the value is a valid page size. Zero is never valid.
pub fn is_valid_page_size<N: PrimInt>(page_size: N) -> bool {
    page_size != N::zero() && page_size.count_ones() == 1
}

pub trait ZeroPadding {
    /// Return the bytes before the first NUL byte, like a C string stored in
    /// a fixed-size field. If there is no NUL, the entire slice is returned.
    fn until_nul(&self) -> &[u8];
}

impl ZeroPadding for [u8] {
    fn until_nul(&self) -> &[u8] {
        let end = memchr::memchr(0, self).unwrap_or(self.len());
        &self[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(calc(0u32, 4096), 0);
        assert_eq!(calc(1u32, 4096), 4095);
        assert_eq!(calc(4096u32, 4096), 0);
        assert_eq!(round(4097u64, 2048), Some(6144));
        assert_eq!(round(u32::MAX, 4096), None);
    }

    #[test]
    fn page_size_validity() {
        assert!(is_valid_page_size(2048u32));
        assert!(is_valid_page_size(4096u32));
        assert!(!is_valid_page_size(0u32));
        assert!(!is_valid_page_size(3000u32));
    }

    #[test]
    fn nul_terminated() {
        assert_eq!(b"abc\0def\0\0".until_nul(), b"abc");
        assert_eq!(b"abc".until_nul(), b"abc");
        assert_eq!(b"\0abc".until_nul(), b"");
    }
}
