//! LabelForge Core - RFID Label Compiler
//!
//! # The Five Laws (Non-Negotiable)
//! 1. Every Label Is Addressable (no two RFID payloads in a batch are equal)
//! 2. Templates Are Contracts (an unresolved placeholder is an error)
//! 3. Validation Is a Gate (BLOCKED never reaches a printer)
//! 4. Deterministic Output (same record, same template, same bytes)
//! 5. One Bad Label Never Sinks the Batch

pub mod config;
pub mod record;
pub mod identifiers;
pub mod sequence;
pub mod templates;
pub mod validation;
pub mod hashing;
pub mod pipeline;
pub mod dispatch;

pub use config::{ConfigError, EngineConfig};
pub use record::{ProductRecord, Quantity};
pub use identifiers::{derive, DerivedIdentifiers, IdentifierError};
pub use sequence::{expand, LabelInstance, RfidSuffixPolicy, SequenceError};
pub use templates::{render, FieldValues, TemplateDocument, TemplateError};
pub use validation::{SafetyLevel, ValidationResult, Validator};
pub use hashing::{canonical_json, compute_batch_hash, compute_document_hash};
pub use pipeline::{
    BatchReport, LabelOutcome, LabelSummary, PipelineError, RecordOutput, RecordRun, RenderPipeline,
    RenderedLabel,
};
pub use dispatch::{dispatch_accepted, DispatchAdapter, DispatchError, DispatchReceipt, SpoolDirectoryAdapter};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
