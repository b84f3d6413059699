//! Template Engine - Placeholder Substitution
//!
//! A placeholder is `{NAME}` with NAME made of `A-Z`, `0-9` and `_`, starting
//! with a letter. Whole tokens are matched, so `{QR_DATA}` and `{QR_DATA_1}`
//! never interfere. Substituted values are not rescanned.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::identifiers::DerivedIdentifiers;
use crate::record::ProductRecord;
use crate::sequence::LabelInstance;

/// Placeholder vocabulary filled for every label.
pub mod fields {
    pub const STYLE_NAME: &str = "STYLE_NAME";
    pub const VPM: &str = "VPM";
    pub const COLOR: &str = "COLOR";
    pub const SIZE: &str = "SIZE";
    pub const PO_INFO: &str = "PO_INFO";
    pub const LOCAL_INFO: &str = "LOCAL_INFO";
    pub const BARCODE: &str = "BARCODE";
    pub const RFID_DATA: &str = "RFID_DATA";
    pub const RFID_DATA_HEX: &str = "RFID_DATA_HEX";
    pub const QR_DATA: &str = "QR_DATA";
    pub const QR_DATA_1: &str = "QR_DATA_1";
    pub const QR_DATA_2: &str = "QR_DATA_2";
    pub const QR_DATA_3: &str = "QR_DATA_3";
}

/// Characters that start a ZPL instruction. A field value carrying one could
/// inject commands into the rendered document.
pub const CONTROL_CHARACTERS: [char; 2] = ['^', '~'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unresolved placeholder(s): {}", .0.iter().map(|n| format!("{{{}}}", n)).collect::<Vec<_>>().join(", "))]
    UnresolvedPlaceholder(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub name: String,
    pub source: String,
}

impl TemplateDocument {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self { name: name.into(), source: source.into() }
    }

    /// Distinct placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for segment in tokenize(&self.source) {
            if let Segment::Placeholder(name) = segment {
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }

    pub fn render(&self, values: &FieldValues) -> Result<String, TemplateError> {
        render(self, values)
    }

    /// Placeholders used by this template whose value contains a
    /// [`CONTROL_CHARACTERS`] character.
    pub fn fields_with_control_characters(&self, values: &FieldValues) -> Vec<String> {
        self.placeholders()
            .into_iter()
            .filter(|name| {
                values
                    .get(name)
                    .is_some_and(|v| v.contains(CONTROL_CHARACTERS.as_slice()))
            })
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValues(BTreeMap<String, String>);

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Field values for one label. The three QR placeholders all carry the
    /// RFID payload; `{QR_DATA}` keeps the VPM for single-QR layouts.
    pub fn for_label(
        record: &ProductRecord,
        identifiers: &DerivedIdentifiers,
        instance: &LabelInstance,
    ) -> Self {
        let rfid = instance.rfid_payload.as_str();
        let mut values = Self::new();
        values
            .insert(fields::STYLE_NAME, record.style_name.as_str())
            .insert(fields::VPM, record.vpm.as_str())
            .insert(fields::COLOR, record.color.as_str())
            .insert(fields::SIZE, record.size.as_str())
            .insert(fields::PO_INFO, identifiers.po_info())
            .insert(fields::LOCAL_INFO, identifiers.local_info())
            .insert(fields::BARCODE, instance.barcode_payload.as_str())
            .insert(fields::RFID_DATA, rfid)
            .insert(fields::RFID_DATA_HEX, hex::encode_upper(rfid.as_bytes()))
            .insert(fields::QR_DATA, record.vpm.as_str())
            .insert(fields::QR_DATA_1, rfid)
            .insert(fields::QR_DATA_2, rfid)
            .insert(fields::QR_DATA_3, rfid);
        values
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'t> {
    Literal(&'t str),
    Placeholder(&'t str),
}

fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn tokenize(source: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = source;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                if open > 0 {
                    segments.push(Segment::Literal(&rest[..open]));
                }
                segments.push(Segment::Placeholder(&after[..close]));
                rest = &after[close + 1..];
            }
            _ => {
                segments.push(Segment::Literal(&rest[..=open]));
                rest = after;
            }
        }
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

pub fn render(template: &TemplateDocument, values: &FieldValues) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.source.len() + 64);
    let mut unresolved: Vec<String> = Vec::new();

    for segment in tokenize(&template.source) {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Placeholder(name) => match values.get(name) {
                Some(value) => output.push_str(value),
                None => {
                    if !unresolved.iter().any(|u| u == name) {
                        unresolved.push(name.to_string());
                    }
                }
            },
        }
    }

    if unresolved.is_empty() {
        Ok(output)
    } else {
        Err(TemplateError::UnresolvedPlaceholder(unresolved))
    }
}
