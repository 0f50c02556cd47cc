//! The daily-reshuffled "routing key": `SHA-256(identity-hash ‖ yyyymmdd-UTC)`.
//! Computing which floodfill is "closest" to a given lookup key depends on
//! this, so it's kept in its own module with direct civil-calendar math
//! (no calendar dependency) rather than pulled in from a date crate the
//! rest of the workspace doesn't otherwise need.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Days-since-epoch -> (year, month, day), per Howard Hinnant's
/// `civil_from_days` algorithm (proleptic Gregorian, UTC).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32; // [1, 31]
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32; // [1, 12]
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Today's date as `yyyymmdd`, UTC.
pub fn today_yyyymmdd() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs();
    yyyymmdd_at(secs)
}

pub fn yyyymmdd_at(unix_secs: u64) -> u32 {
    let days = (unix_secs / 86_400) as i64;
    let (y, m, d) = civil_from_days(days);
    (y as u32) * 10_000 + m * 100 + d
}

/// The routing key for `identity_hash` on the given calendar day.
pub fn routing_key(identity_hash: &[u8; 32], yyyymmdd: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(identity_hash);
    hasher.update(yyyymmdd.to_string().as_bytes());
    hasher.finalize().into()
}

/// XOR distance between two 32-byte keys, compared lexicographically on
/// the resulting bytes (equivalent to treating them as big-endian
/// integers).
pub fn xor_distance(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_epoch_date() {
        assert_eq!(yyyymmdd_at(0), 19_700_101);
    }

    #[test]
    fn known_recent_date() {
        // 2024-03-01 00:00:00 UTC
        assert_eq!(yyyymmdd_at(1_709_251_200), 20_240_301);
    }

    #[test]
    fn routing_key_changes_daily() {
        let hash = [7u8; 32];
        let key_today = routing_key(&hash, 20_240_301);
        let key_tomorrow = routing_key(&hash, 20_240_302);
        assert_ne!(key_today, key_tomorrow);
    }

    #[test]
    fn xor_distance_is_zero_for_identical_keys() {
        let a = [3u8; 32];
        assert_eq!(xor_distance(&a, &a), [0u8; 32]);
    }

    #[test]
    fn xor_distance_is_symmetric() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(xor_distance(&a, &b), xor_distance(&b, &a));
    }
}
