//! Sequence Expander - One Inventory Line, N Addressable Labels
//!
//! Payload layout: `baseBarcode + poDigits + index`, where the index is
//! zero-padded to the digit width of the batch quantity so every payload in
//! a batch has the same length.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SequencePolicy;
use crate::identifiers::DerivedIdentifiers;

/// Upper bound for `barcodeTargetWidth`.
pub const MAX_BARCODE_TARGET_WIDTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Invalid quantity {requested}: must be between 1 and {max}")]
    InvalidQuantity { requested: i64, max: u32 },

    #[error("Invalid quantity '{0}': not a whole number")]
    UnparseableQuantity(String),

    #[error("RFID suffix policy '{0}' puts letters into the tag payload and is not allowed")]
    AlphabeticSuffix(&'static str),

    #[error("RFID suffix policy '{policy}' size {size} exceeds the tag limit of {max}")]
    SuffixTooLong { policy: &'static str, size: usize, max: usize },

    #[error("Barcode target width {width} exceeds {max}")]
    BarcodeTooWide { width: usize, max: usize },
}

/// How the RFID payload is completed after `barcodePayload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RfidSuffixPolicy {
    /// Tag payload equals the barcode payload.
    Plain,
    /// Fixed block of zero digits appended.
    ZeroBlock { width: usize },
    /// Right-padded with zeros up to `target` characters (ZebraDesigner layout).
    PadToLength { target: usize },
    /// Appends `F000`. Accepted by the parser so old configs get a clear error,
    /// refused by `EngineConfig::validate` and `expand`.
    LegacyFSuffix,
}

impl Default for RfidSuffixPolicy {
    fn default() -> Self {
        Self::ZeroBlock { width: 8 }
    }
}

impl RfidSuffixPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::ZeroBlock { .. } => "zeroBlock",
            Self::PadToLength { .. } => "padToLength",
            Self::LegacyFSuffix => "legacyFSuffix",
        }
    }

    pub fn is_alphabetic(&self) -> bool {
        matches!(self, Self::LegacyFSuffix)
    }

    /// Refuses policies that cannot produce a digit payload of at most
    /// `max_length` characters.
    pub fn check(&self, max_length: usize) -> Result<(), SequenceError> {
        match *self {
            Self::LegacyFSuffix => Err(SequenceError::AlphabeticSuffix(self.name())),
            Self::ZeroBlock { width: size } | Self::PadToLength { target: size }
                if size > max_length =>
            {
                Err(SequenceError::SuffixTooLong { policy: self.name(), size, max: max_length })
            }
            _ => Ok(()),
        }
    }

    fn apply(&self, base: &str) -> String {
        match self {
            Self::Plain => base.to_string(),
            Self::ZeroBlock { width } => format!("{}{}", base, "0".repeat(*width)),
            Self::PadToLength { target } => format!("{:0<target$}", base, target = *target),
            Self::LegacyFSuffix => format!("{}F000", base),
        }
    }
}

impl SequencePolicy {
    /// Checks the parts of the policy that `expand` relies on.
    pub fn check(&self) -> Result<(), SequenceError> {
        self.rfid_suffix.check(self.rfid_max_length)?;
        match self.barcode_target_width {
            Some(width) if width > MAX_BARCODE_TARGET_WIDTH => Err(SequenceError::BarcodeTooWide {
                width,
                max: MAX_BARCODE_TARGET_WIDTH,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelInstance {
    pub sequence_index: u32,
    pub barcode_payload: String,
    pub rfid_payload: String,
}

/// Lazily yields the labels of one batch, in index order. Consumed once.
#[derive(Debug)]
pub struct LabelSequence<'a> {
    identifiers: &'a DerivedIdentifiers,
    policy: &'a SequencePolicy,
    quantity: u32,
    index_width: usize,
    next: u64,
}

impl<'a> Iterator for LabelSequence<'a> {
    type Item = LabelInstance;

    fn next(&mut self) -> Option<LabelInstance> {
        let index = u32::try_from(self.next).ok().filter(|i| *i <= self.quantity)?;
        self.next += 1;

        let mut barcode_payload = format!(
            "{}{}{:0width$}",
            self.identifiers.base_barcode,
            self.identifiers.po_digits,
            index,
            width = self.index_width
        );
        let rfid_payload = self.policy.rfid_suffix.apply(&barcode_payload);

        if let Some(target) = self.policy.barcode_target_width {
            barcode_payload = format!("{:0<target$}", barcode_payload, target = target);
        }

        Some(LabelInstance { sequence_index: index, barcode_payload, rfid_payload })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (u64::from(self.quantity) + 1).saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LabelSequence<'_> {}

pub fn expand<'a>(
    identifiers: &'a DerivedIdentifiers,
    quantity: i64,
    policy: &'a SequencePolicy,
) -> Result<LabelSequence<'a>, SequenceError> {
    policy.check()?;
    let max = policy.max_batch_size;
    let quantity = u32::try_from(quantity)
        .ok()
        .filter(|q| (1..=max).contains(q))
        .ok_or(SequenceError::InvalidQuantity { requested: quantity, max })?;

    Ok(LabelSequence {
        identifiers,
        policy,
        quantity,
        index_width: decimal_width(quantity),
        next: 1,
    })
}

fn decimal_width(n: u32) -> usize {
    n.to_string().len()
}
