// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request MACs.
//!
//! The MAC input is the canonical encoding of `(context, body)`:
//! `len(context) as u64 BE ‖ context ‖ len(body) as u64 BE ‖ body`.
//! Length prefixes keep `("ab", "c")` and `("a", "bc")` distinct.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const MAC_LEN: usize = 32;

fn keyed(key: &[u8], context: &[u8], body: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(&(context.len() as u64).to_be_bytes());
    mac.update(context);
    mac.update(&(body.len() as u64).to_be_bytes());
    mac.update(body);
    mac
}

/// Compute the MAC of a request under `key`.
pub fn compute_mac(key: &[u8], context: &[u8], body: &[u8]) -> [u8; MAC_LEN] {
    keyed(key, context, body).finalize().into_bytes().into()
}

/// Verify a request MAC in constant time.
pub fn verify_mac(key: &[u8], mac: &[u8], context: &[u8], body: &[u8]) -> bool {
    keyed(key, context, body).verify_slice(mac).is_ok()
}
