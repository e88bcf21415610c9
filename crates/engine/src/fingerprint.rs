//! Content fingerprints for dedup and skip-if-unchanged sync.
//!
//! Pure functions, no I/O. The fingerprint is recomputed from record
//! fields rather than stored, so edits are picked up automatically.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::{MoneyCents, bills::{BillKind, BillRecord}};

/// Trim and NFC-normalize free text so visually identical names hash
/// identically.
fn canonical_text(input: &str) -> String {
    input.trim().nfc().collect()
}

fn hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// SHA-256 over the canonical serialization of the dedup-relevant fields.
///
/// The timestamp enters as a bucket index so near-simultaneous duplicates
/// land on the same value; `bucket_secs` defaults to the grouping window.
pub fn fingerprint(
    money: MoneyCents,
    kind: BillKind,
    account_from: &str,
    category: &str,
    occurred_at: DateTime<Utc>,
    bucket_secs: i64,
) -> String {
    let bucket = occurred_at.timestamp().div_euclid(bucket_secs.max(1));
    let canonical = format!(
        "money={}|type={}|account={}|category={}|bucket={bucket}",
        money.cents(),
        kind.as_str(),
        canonical_text(account_from),
        canonical_text(category),
    );
    hex(&Sha256::digest(canonical.as_bytes()))
}

pub fn record_fingerprint(record: &BillRecord, bucket_secs: i64) -> String {
    fingerprint(
        record.money,
        record.kind,
        &record.account_from,
        &record.category,
        record.occurred_at,
        bucket_secs,
    )
}

/// Folds per-record fingerprints into one batch hash.
///
/// Sorted before hashing so the result does not depend on query order.
pub fn batch_fingerprint<I>(prints: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut prints: Vec<String> = prints.into_iter().collect();
    prints.sort();
    let mut hasher = Sha256::new();
    for print in &prints {
        hasher.update(print.as_bytes());
        hasher.update(b"\n");
    }
    hex(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn stable_across_calls() {
        let a = fingerprint(MoneyCents::new(10000), BillKind::Expend, "尾号1234", "日常", at(1_700_000_000), 180);
        let b = fingerprint(MoneyCents::new(10000), BillKind::Expend, "尾号1234", "日常", at(1_700_000_000), 180);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn bucket_collapses_nearby_timestamps() {
        let base = fingerprint(MoneyCents::new(5000), BillKind::Expend, "a", "b", at(1_700_000_000), 180);
        let near = fingerprint(MoneyCents::new(5000), BillKind::Expend, "a", "b", at(1_700_000_003), 180);
        assert_eq!(base, near);

        let far = fingerprint(MoneyCents::new(5000), BillKind::Expend, "a", "b", at(1_700_000_000 + 400), 180);
        assert_ne!(base, far);
    }

    #[test]
    fn nfc_forms_hash_identically() {
        // "é" precomposed vs "e" + combining acute.
        let composed = fingerprint(MoneyCents::new(100), BillKind::Expend, "caf\u{e9}", "", at(0), 180);
        let decomposed = fingerprint(MoneyCents::new(100), BillKind::Expend, "cafe\u{301}", "", at(0), 180);
        assert_eq!(composed, decomposed);
    }

    #[test]
    fn any_field_change_moves_the_print() {
        let base = fingerprint(MoneyCents::new(100), BillKind::Expend, "a", "b", at(0), 180);
        assert_ne!(base, fingerprint(MoneyCents::new(101), BillKind::Expend, "a", "b", at(0), 180));
        assert_ne!(base, fingerprint(MoneyCents::new(100), BillKind::Income, "a", "b", at(0), 180));
        assert_ne!(base, fingerprint(MoneyCents::new(100), BillKind::Expend, "x", "b", at(0), 180));
    }

    #[test]
    fn batch_hash_ignores_order() {
        let a = "aa".to_string();
        let b = "bb".to_string();
        assert_eq!(
            batch_fingerprint([a.clone(), b.clone()]),
            batch_fingerprint([b, a])
        );
        assert_ne!(batch_fingerprint(["aa".to_string()]), batch_fingerprint(["ab".to_string()]));
    }
}
