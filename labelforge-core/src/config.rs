//! Engine Configuration - Deployment-Time Policy
//!
//! Every knob has a default. A missing file section means "use the defaults",
//! never "disable the check".

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::sequence::{RfidSuffixPolicy, SequenceError, MAX_BARCODE_TARGET_WIDTH};

/// Largest tag payload any supported encoder accepts.
pub const RFID_MAX_LENGTH_CEILING: usize = 128;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("RFID suffix policy '{0}' puts letters into the tag payload and is not allowed")]
    AlphabeticSuffix(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub identifiers: IdentifierPolicy,
    #[serde(default)]
    pub sequence: SequencePolicy,
    #[serde(default)]
    pub validator: ValidatorPolicy,
    #[serde(default)]
    pub dispatch: DispatchPolicy,
}

impl EngineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate in one step.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ids = &self.identifiers;
        if ids.barcode_width == 0 || ids.barcode_width > MAX_BARCODE_TARGET_WIDTH {
            return Err(ConfigError::InvalidValue {
                field: "identifiers.barcodeWidth",
                message: format!("must be between 1 and {}", MAX_BARCODE_TARGET_WIDTH),
            });
        }
        if ids.local_display_width == 0 {
            return Err(invalid("identifiers.localDisplayWidth", "must be at least 1"));
        }
        if let Some(po) = &ids.fallback_po {
            if po.is_empty() || !po.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("identifiers.fallbackPo", "must be a non-empty digit string"));
            }
        }
        if !ids.fallback_barcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("identifiers.fallbackBarcode", "must contain digits only"));
        }

        let seq = &self.sequence;
        if seq.max_batch_size == 0 {
            return Err(invalid("sequence.maxBatchSize", "must be at least 1"));
        }
        if seq.rfid_max_length == 0 || seq.rfid_max_length > RFID_MAX_LENGTH_CEILING {
            return Err(ConfigError::InvalidValue {
                field: "sequence.rfidMaxLength",
                message: format!("must be between 1 and {}", RFID_MAX_LENGTH_CEILING),
            });
        }
        seq.check().map_err(|e| match e {
            SequenceError::AlphabeticSuffix(name) => ConfigError::AlphabeticSuffix(name.to_string()),
            SequenceError::BarcodeTooWide { .. } => ConfigError::InvalidValue {
                field: "sequence.barcodeTargetWidth",
                message: e.to_string(),
            },
            other => ConfigError::InvalidValue {
                field: "sequence.rfidSuffix",
                message: other.to_string(),
            },
        })?;

        let val = &self.validator;
        if val.dangerous_instruction_prefixes.is_empty() {
            return Err(invalid(
                "validator.dangerousInstructionPrefixes",
                "an empty list would let RFID writes through unchecked",
            ));
        }
        if val.max_document_length == 0 {
            return Err(invalid("validator.maxDocumentLength", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::InvalidValue { field, message: message.to_string() }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierPolicy {
    #[serde(default = "default_barcode_width")]
    pub barcode_width: usize,
    #[serde(default = "default_fallback_barcode")]
    pub fallback_barcode: String,
    /// `None` makes a VPM without a PO segment a hard error.
    #[serde(default = "default_fallback_po")]
    pub fallback_po: Option<String>,
    #[serde(default = "default_local_segment")]
    pub local_segment: usize,
    #[serde(default = "default_local_display_width")]
    pub local_display_width: usize,
    #[serde(default = "default_local_fallback")]
    pub local_fallback: String,
}

fn default_barcode_width() -> usize { 12 }
fn default_fallback_barcode() -> String { "0".repeat(12) }
fn default_fallback_po() -> Option<String> { Some("0000".to_string()) }
fn default_local_segment() -> usize { 4 }
fn default_local_display_width() -> usize { 3 }
fn default_local_fallback() -> String { "000".to_string() }

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self {
            barcode_width: default_barcode_width(),
            fallback_barcode: default_fallback_barcode(),
            fallback_po: default_fallback_po(),
            local_segment: default_local_segment(),
            local_display_width: default_local_display_width(),
            local_fallback: default_local_fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencePolicy {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u32,
    /// Right-pads the barcode payload with zeros. Never truncates.
    #[serde(default)]
    pub barcode_target_width: Option<usize>,
    #[serde(default)]
    pub rfid_suffix: RfidSuffixPolicy,
    #[serde(default = "default_rfid_max_length")]
    pub rfid_max_length: usize,
}

fn default_max_batch_size() -> u32 { 100 }
fn default_rfid_max_length() -> usize { 50 }

impl Default for SequencePolicy {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            barcode_target_width: None,
            rfid_suffix: RfidSuffixPolicy::default(),
            rfid_max_length: default_rfid_max_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorPolicy {
    #[serde(default = "default_dangerous_prefixes")]
    pub dangerous_instruction_prefixes: Vec<String>,
    #[serde(default = "default_safe_prefixes")]
    pub safe_instruction_prefixes: Vec<String>,
    #[serde(default = "default_start_instruction")]
    pub start_instruction: String,
    #[serde(default = "default_end_instruction")]
    pub end_instruction: String,
    #[serde(default = "default_max_document_length")]
    pub max_document_length: usize,
}

fn default_dangerous_prefixes() -> Vec<String> {
    ["^RFW", "^RFR", "^RFI", "^RFT", "^RFU"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_safe_prefixes() -> Vec<String> {
    [
        "^XA", "^XZ", // start/end
        "^FO", "^FT", "^FD", "^FS", "^FH", "^FX", "^FB", // fields
        "^A", "^CF", "^CI", // fonts and encoding
        "^BC", "^BY", "^BQ", "^BE", "^BU", // barcodes and QR
        "^GB", "^LH", "^LL", "^LS", "^LT", "^PW", "^PQ", "^MM", "^MN", "^MT", "^PO", "^PR",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_start_instruction() -> String { "^XA".to_string() }
fn default_end_instruction() -> String { "^XZ".to_string() }
fn default_max_document_length() -> usize { 16 * 1024 }

impl Default for ValidatorPolicy {
    fn default() -> Self {
        Self {
            dangerous_instruction_prefixes: default_dangerous_prefixes(),
            safe_instruction_prefixes: default_safe_prefixes(),
            start_instruction: default_start_instruction(),
            end_instruction: default_end_instruction(),
            max_document_length: default_max_document_length(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPolicy {
    /// BLOCKED is never accepted regardless of this flag.
    #[serde(default)]
    pub accept_risky: bool,
    #[serde(default)]
    pub settle_delay_ms: u64,
}
