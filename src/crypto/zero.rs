// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secure zeroing.

use std::ops::{Deref, DerefMut};

use zeroize::Zeroize;

/// Overwrite `buffer` with zeros. The write is not elided by the optimiser.
pub fn secure_zero(buffer: &mut [u8]) {
    buffer.zeroize();
}

/// Borrowed buffer that is zeroed when the guard goes out of scope.
///
/// Any function that receives plaintext or key material by `&mut` wraps it in
/// this guard first, so every return path (early `?` included) wipes it.
pub struct WipeOnDrop<'a>(&'a mut [u8]);

impl<'a> WipeOnDrop<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self(buffer)
    }
}

impl Deref for WipeOnDrop<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0
    }
}

impl DerefMut for WipeOnDrop<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.0
    }
}

impl Drop for WipeOnDrop<'_> {
    fn drop(&mut self) {
        secure_zero(self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_zero_clears_buffer() {
        let mut buf = *b"top secret";
        secure_zero(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn guard_wipes_on_early_return() {
        fn fails(buf: &mut [u8]) -> Result<(), ()> {
            let guard = WipeOnDrop::new(buf);
            if guard[0] == b'k' {
                return Err(());
            }
            Ok(())
        }

        let mut buf = *b"key material";
        assert!(fails(&mut buf).is_err());
        assert_eq!(buf, [0u8; 12]);
    }
}
