//! Identifier Derivation - VPM to Barcode Root and PO Digits

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::IdentifierPolicy;
use crate::record::ProductRecord;

pub const VPM_SEPARATOR: char = '-';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Malformed identifier source: VPM '{0}' has no purchase-order digits and no fallback PO is configured")]
    MalformedIdentifierSource(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedIdentifiers {
    pub base_barcode: String,
    pub po_digits: String,
    /// Display only. Never part of a payload.
    pub local_fragment: String,
}

impl DerivedIdentifiers {
    pub fn po_info(&self) -> String {
        format!("PO{}", self.po_digits)
    }

    pub fn local_info(&self) -> String {
        format!("Local.{}", self.local_fragment)
    }
}

pub fn derive(
    record: &ProductRecord,
    policy: &IdentifierPolicy,
) -> Result<DerivedIdentifiers, IdentifierError> {
    let segments: Vec<&str> = record.vpm.split(VPM_SEPARATOR).map(str::trim).collect();

    let po_digits = derive_po_digits(record, &segments, policy)?;
    let base_barcode = derive_base_barcode(record, policy);
    let local_fragment = derive_local_fragment(&segments, policy);

    debug!(
        vpm = %record.vpm,
        base_barcode = %base_barcode,
        po_digits = %po_digits,
        "derived identifiers"
    );

    Ok(DerivedIdentifiers { base_barcode, po_digits, local_fragment })
}

fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn derive_po_digits(
    record: &ProductRecord,
    segments: &[&str],
    policy: &IdentifierPolicy,
) -> Result<String, IdentifierError> {
    let from_override = record.po.as_deref().map(digits_only);
    let from_vpm = segments.first().map(|s| digits_only(s));

    from_override
        .into_iter()
        .chain(from_vpm)
        .find(|d| !d.is_empty())
        .or_else(|| policy.fallback_po.as_deref().map(digits_only).filter(|d| !d.is_empty()))
        .ok_or_else(|| IdentifierError::MalformedIdentifierSource(record.vpm.clone()))
}

fn derive_base_barcode(record: &ProductRecord, policy: &IdentifierPolicy) -> String {
    let from_override = record.barcode.as_deref().map(digits_only);
    let from_vpm = Some(digits_only(&record.vpm.replace(VPM_SEPARATOR, "")));

    let source = from_override
        .into_iter()
        .chain(from_vpm)
        .find(|d| !d.is_empty())
        .unwrap_or_else(|| digits_only(&policy.fallback_barcode));

    fit_width(&source, policy.barcode_width.max(1))
}

/// Keeps the leading `width` digits, left-padding short sources with zeros.
pub fn fit_width(digits: &str, width: usize) -> String {
    let truncated: String = digits.chars().take(width).collect();
    format!("{:0>width$}", truncated, width = width)
}

fn derive_local_fragment(segments: &[&str], policy: &IdentifierPolicy) -> String {
    segments
        .get(policy.local_segment)
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().take(policy.local_display_width).collect())
        .unwrap_or_else(|| policy.local_fallback.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vpm: &str) -> ProductRecord {
        ProductRecord::new("JASMINE", vpm, "SILVER", "11.0")
    }

    #[test]
    fn test_reference_vpm() {
        let ids = derive(&record("L458-JASM-11.0-SILV-1885"), &IdentifierPolicy::default()).unwrap();
        assert_eq!(ids.po_digits, "458");
        // L458JASM11.0SILV1885 -> 4581101885 -> left-padded to 12
        assert_eq!(ids.base_barcode, "004581101885");
        assert_eq!(ids.local_fragment, "188");
        assert_eq!(ids.po_info(), "PO458");
        assert_eq!(ids.local_info(), "Local.188");
    }

    #[test]
    fn test_explicit_barcode_wins_and_truncates() {
        let rec = record("L458-JASM-11.0-SILV-1885").with_barcode("1974161451320099");
        let ids = derive(&rec, &IdentifierPolicy::default()).unwrap();
        assert_eq!(ids.base_barcode, "197416145132");
    }

    #[test]
    fn test_non_digit_barcode_falls_through_to_vpm() {
        let rec = record("L0656-HANA-5.0-WHIT-1120").with_barcode("N/A");
        let ids = derive(&rec, &IdentifierPolicy::default()).unwrap();
        assert_eq!(ids.base_barcode, "000656501120");
    }

    #[test]
    fn test_empty_vpm_uses_fallbacks() {
        let ids = derive(&record(""), &IdentifierPolicy::default()).unwrap();
        assert_eq!(ids.base_barcode, "000000000000");
        assert_eq!(ids.po_digits, "0000");
        assert_eq!(ids.local_fragment, "000");
    }

    #[test]
    fn test_missing_po_without_fallback_is_malformed() {
        let policy = IdentifierPolicy { fallback_po: None, ..Default::default() };
        let err = derive(&record("JASM"), &policy).unwrap_err();
        assert_eq!(err, IdentifierError::MalformedIdentifierSource("JASM".to_string()));
    }

    #[test]
    fn test_po_override_used() {
        let rec = record("L458-JASM-11.0-SILV-1885").with_po("PO0464");
        let ids = derive(&rec, &IdentifierPolicy::default()).unwrap();
        assert_eq!(ids.po_digits, "0464");
    }

    #[test]
    fn test_short_vpm_local_fallback() {
        let ids = derive(&record("L12-ABC"), &IdentifierPolicy::default()).unwrap();
        assert_eq!(ids.local_fragment, "000");
        assert_eq!(ids.base_barcode, "000000000012");
    }

    #[test]
    fn test_fit_width() {
        assert_eq!(fit_width("123", 5), "00123");
        assert_eq!(fit_width("1234567", 5), "12345");
        assert_eq!(fit_width("", 3), "000");
    }
}
