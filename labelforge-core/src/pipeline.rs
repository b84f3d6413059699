//! Render Pipeline - Single Entry Point
//!
//! CRITICAL: process MUST validate every rendered document. No bypass.
//!
//! Per record: DERIVING -> EXPANDING -> RENDERING -> VALIDATING, then each
//! label ends ACCEPTED or REJECTED. A rejected label never stops its
//! siblings; only record-level failures (identifiers, quantity) abort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, EngineConfig};
use crate::hashing::{compute_batch_hash, compute_document_hash};
use crate::identifiers::{derive, DerivedIdentifiers, IdentifierError};
use crate::record::{ProductRecord, Quantity};
use crate::sequence::{expand, LabelInstance, SequenceError};
use crate::templates::{FieldValues, TemplateDocument, TemplateError};
use crate::validation::{SafetyLevel, ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelStage {
    Deriving,
    Expanding,
    Rendering,
    Validating,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RejectionKind {
    RfidPayloadRejected,
    ControlCharacterInField,
    UnresolvedPlaceholder,
    BlockedByValidator,
    RiskyNotAccepted,
}

/// One resolved document. Produced per label, dispatched at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedLabel {
    pub sequence_index: u32,
    pub document: String,
    pub document_hash: String,
    pub validation: ValidationResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelOutcome {
    pub instance: LabelInstance,
    /// `None` when the label failed before a document existed.
    pub rendered: Option<RenderedLabel>,
    pub accepted_for_dispatch: bool,
    /// Stage the label was rejected at, or `Accepted`.
    pub stage: LabelStage,
    pub rejection: Option<RejectionKind>,
    pub reason: String,
}

impl LabelOutcome {
    fn rejected(
        instance: LabelInstance,
        rendered: Option<RenderedLabel>,
        stage: LabelStage,
        rejection: RejectionKind,
        reason: String,
    ) -> Self {
        warn!(
            sequence_index = instance.sequence_index,
            ?stage,
            ?rejection,
            reason = %reason,
            "label rejected"
        );
        Self {
            instance,
            rendered,
            accepted_for_dispatch: false,
            stage,
            rejection: Some(rejection),
            reason,
        }
    }

    pub fn summary(&self) -> LabelSummary {
        LabelSummary {
            sequence_index: self.instance.sequence_index,
            barcode_payload: self.instance.barcode_payload.clone(),
            rfid_payload: self.instance.rfid_payload.clone(),
            accepted: self.accepted_for_dispatch,
            reason: self.reason.clone(),
            safety_level: self.rendered.as_ref().map(|r| r.validation.safety_level),
            document_hash: self.rendered.as_ref().map(|r| r.document_hash.clone()),
        }
    }
}

/// Operator-facing view of one label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSummary {
    pub sequence_index: u32,
    pub barcode_payload: String,
    pub rfid_payload: String,
    pub accepted: bool,
    pub reason: String,
    #[serde(default)]
    pub safety_level: Option<SafetyLevel>,
    #[serde(default)]
    pub document_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReport {
    pub style_name: String,
    pub vpm: String,
    pub requested_quantity: Quantity,
    #[serde(default)]
    pub identifiers: Option<DerivedIdentifiers>,
    #[serde(default)]
    pub error: Option<String>,
    pub labels: Vec<LabelSummary>,
    pub accepted_count: usize,
    pub rejected_count: usize,
    #[serde(default)]
    pub record_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
    pub template_name: String,
    pub records: Vec<RecordReport>,
    pub total_labels: usize,
    pub accepted_labels: usize,
}

impl BatchReport {
    pub fn all_accepted(&self) -> bool {
        self.records.iter().all(|r| r.error.is_none()) && self.accepted_labels == self.total_labels
    }
}

/// Identifiers and ordered label outcomes of one processed record.
#[derive(Debug, Clone)]
pub struct RecordOutput {
    pub identifiers: DerivedIdentifiers,
    pub outcomes: Vec<LabelOutcome>,
}

/// Result of running one record through the pipeline.
pub struct RecordRun<'r> {
    pub record: &'r ProductRecord,
    pub result: Result<RecordOutput, PipelineError>,
}

/// The render pipeline - single entry point for label generation
pub struct RenderPipeline {
    config: EngineConfig,
    validator: Validator,
}

impl RenderPipeline {
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let validator = Validator::new(config.validator.clone());
        Ok(Self { config, validator })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn derive(&self, record: &ProductRecord) -> Result<DerivedIdentifiers, PipelineError> {
        Ok(derive(record, &self.config.identifiers)?)
    }

    /// Validate a rendered document.
    ///
    /// This is the ONLY validation entry point.
    pub fn validate_document(&self, document: &str) -> ValidationResult {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.validator.validate(document)
    }

    /// Process one record into ordered label outcomes.
    ///
    /// CRITICAL: Every rendered document goes through validate_document.
    pub fn process(
        &self,
        record: &ProductRecord,
        template: &TemplateDocument,
    ) -> Result<Vec<LabelOutcome>, PipelineError> {
        Ok(self.run_record(record, template)?.outcomes)
    }

    fn run_record(
        &self,
        record: &ProductRecord,
        template: &TemplateDocument,
    ) -> Result<RecordOutput, PipelineError> {
        debug!(vpm = %record.vpm, stage = ?LabelStage::Deriving, "processing record");
        let identifiers = self.derive(record)?;

        debug!(vpm = %record.vpm, stage = ?LabelStage::Expanding, quantity = %record.quantity);
        let quantity = match &record.quantity {
            Quantity::Count(n) => *n,
            Quantity::Unparseable(raw) => {
                return Err(SequenceError::UnparseableQuantity(raw.clone()).into())
            }
        };
        let sequence = expand(&identifiers, quantity, &self.config.sequence)?;

        let outcomes: Vec<LabelOutcome> = sequence
            .map(|instance| self.process_instance(record, &identifiers, template, instance))
            .collect();

        let accepted = outcomes.iter().filter(|o| o.accepted_for_dispatch).count();
        info!(
            vpm = %record.vpm,
            template = %template.name,
            accepted,
            rejected = outcomes.len() - accepted,
            "record processed"
        );
        Ok(RecordOutput { identifiers, outcomes })
    }

    fn process_instance(
        &self,
        record: &ProductRecord,
        identifiers: &DerivedIdentifiers,
        template: &TemplateDocument,
        instance: LabelInstance,
    ) -> LabelOutcome {
        if let Err(reason) = self.check_rfid_payload(&instance.rfid_payload) {
            return LabelOutcome::rejected(
                instance,
                None,
                LabelStage::Expanding,
                RejectionKind::RfidPayloadRejected,
                reason,
            );
        }

        debug!(sequence_index = instance.sequence_index, stage = ?LabelStage::Rendering);
        let values = FieldValues::for_label(record, identifiers, &instance);
        let tainted = template.fields_with_control_characters(&values);
        if !tainted.is_empty() {
            let reason = format!(
                "Field value(s) contain ZPL command prefixes: {}",
                tainted.join(", ")
            );
            return LabelOutcome::rejected(
                instance,
                None,
                LabelStage::Rendering,
                RejectionKind::ControlCharacterInField,
                reason,
            );
        }
        let document = match template.render(&values) {
            Ok(document) => document,
            Err(e @ TemplateError::UnresolvedPlaceholder(_)) => {
                return LabelOutcome::rejected(
                    instance,
                    None,
                    LabelStage::Rendering,
                    RejectionKind::UnresolvedPlaceholder,
                    e.to_string(),
                );
            }
        };

        debug!(sequence_index = instance.sequence_index, stage = ?LabelStage::Validating);
        let validation = self.validate_document(&document);
        let rendered = RenderedLabel {
            sequence_index: instance.sequence_index,
            document_hash: compute_document_hash(&document),
            document,
            validation,
        };

        let level = rendered.validation.safety_level;
        let reason = rendered.validation.reason.clone();
        match level {
            SafetyLevel::Blocked => LabelOutcome::rejected(
                instance,
                Some(rendered),
                LabelStage::Validating,
                RejectionKind::BlockedByValidator,
                reason,
            ),
            SafetyLevel::Risky if !self.config.dispatch.accept_risky => LabelOutcome::rejected(
                instance,
                Some(rendered),
                LabelStage::Validating,
                RejectionKind::RiskyNotAccepted,
                reason,
            ),
            SafetyLevel::Risky | SafetyLevel::Safe => LabelOutcome {
                instance,
                rendered: Some(rendered),
                accepted_for_dispatch: true,
                stage: LabelStage::Accepted,
                rejection: None,
                reason,
            },
        }
    }

    /// Tag hardware takes digit strings up to `rfidMaxLength`.
    fn check_rfid_payload(&self, payload: &str) -> Result<(), String> {
        let max = self.config.sequence.rfid_max_length;
        if payload.is_empty() {
            return Err("RFID payload is empty".to_string());
        }
        if !payload.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("RFID payload '{}' contains non-digit characters", payload));
        }
        if payload.len() > max {
            return Err(format!(
                "RFID payload is {} characters, tag limit is {}",
                payload.len(),
                max
            ));
        }
        Ok(())
    }

    /// Run every record independently; a record-level error is kept with
    /// its record and the rest of the batch continues.
    pub fn process_batch<'r>(
        &self,
        records: &'r [ProductRecord],
        template: &TemplateDocument,
    ) -> Vec<RecordRun<'r>> {
        records
            .iter()
            .map(|record| RecordRun { record, result: self.run_record(record, template) })
            .collect()
    }

    pub fn record_report(
        &self,
        template: &TemplateDocument,
        run: &RecordRun<'_>,
    ) -> Result<RecordReport, PipelineError> {
        let record = run.record;
        let mut report = RecordReport {
            style_name: record.style_name.clone(),
            vpm: record.vpm.clone(),
            requested_quantity: record.quantity.clone(),
            identifiers: None,
            error: None,
            labels: vec![],
            accepted_count: 0,
            rejected_count: 0,
            record_hash: None,
        };

        match &run.result {
            Ok(output) => {
                report.identifiers = Some(output.identifiers.clone());
                report.labels = output.outcomes.iter().map(LabelOutcome::summary).collect();
                report.accepted_count = output
                    .outcomes
                    .iter()
                    .filter(|o| o.accepted_for_dispatch)
                    .count();
                report.rejected_count = output.outcomes.len() - report.accepted_count;
                report.record_hash = Some(compute_batch_hash(
                    &template.name,
                    &template.source,
                    &report.labels,
                    ENGINE_VERSION,
                )?);
            }
            Err(e) => {
                warn!(vpm = %record.vpm, error = %e, "record rejected");
                report.error = Some(e.to_string());
            }
        }
        Ok(report)
    }

    pub fn batch_report(
        &self,
        template: &TemplateDocument,
        runs: &[RecordRun<'_>],
    ) -> Result<BatchReport, PipelineError> {
        let records = runs
            .iter()
            .map(|run| self.record_report(template, run))
            .collect::<Result<Vec<_>, _>>()?;

        let total_labels = records.iter().map(|r| r.labels.len()).sum();
        let accepted_labels = records.iter().map(|r| r.accepted_count).sum();

        Ok(BatchReport {
            batch_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            template_name: template.name.clone(),
            records,
            total_labels,
            accepted_labels,
        })
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            validator: Validator::default(),
        }
    }
}
