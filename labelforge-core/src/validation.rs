//! Command Safety Validator - Rule/Policy Separation
//!
//! Rules produce structured findings.
//! Policy maps findings to a safety level.
//!
//! Instructions are matched case-insensitively: the printer treats `^rfw`
//! exactly like `^RFW`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ValidatorPolicy;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyLevel {
    Safe,
    Risky,
    Blocked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    /// Must never reach the printer.
    Block,
    /// Dispatch only when policy accepts risky documents.
    Risk,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule: String,
    pub severity: FindingSeverity,
    pub message: String,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub safety_level: SafetyLevel,
    pub void_risk: bool,
    pub matched_risky_instructions: Vec<String>,
    pub reason: String,
    pub findings: Vec<Finding>,
    /// Informational only; never changes the safety level.
    pub unrecognized_instructions: Vec<String>,
    pub instruction_count: usize,
    pub document_length: usize,
}

impl ValidationResult {
    pub fn is_blocked(&self) -> bool {
        self.safety_level == SafetyLevel::Blocked
    }

    /// BLOCKED is never dispatchable; RISKY only when the caller allows it.
    pub fn is_dispatchable(&self, accept_risky: bool) -> bool {
        match self.safety_level {
            SafetyLevel::Safe => true,
            SafetyLevel::Risky => accept_risky,
            SafetyLevel::Blocked => false,
        }
    }
}

/// Command prefix characters in effect at some point of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub caret: char,
    pub tilde: char,
}

impl Default for Markers {
    fn default() -> Self {
        Self { caret: '^', tilde: '~' }
    }
}

/// A `^CC`/`~CC` (caret) or `^CT`/`~CT` (tilde) instruction seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerChange {
    /// Canonical spelling, e.g. `~CC`.
    pub instruction: String,
    pub from: char,
    pub to: char,
}

impl MarkerChange {
    pub fn restores_default(&self) -> bool {
        let defaults = Markers::default();
        self.to == defaults.caret || self.to == defaults.tilde
    }
}

/// A document split into instruction tokens, each running up to the next
/// instruction marker or line break.
///
/// The scanner follows marker changes the way the printer does: after `~CC!`
/// the text `!RFW` is the instruction `^RFW`. Tokens are stored with the
/// default markers so rules never see the substituted characters.
#[derive(Debug, Clone)]
pub struct ScannedDocument<'d> {
    pub text: &'d str,
    pub instructions: Vec<String>,
    pub marker_changes: Vec<MarkerChange>,
}

impl<'d> ScannedDocument<'d> {
    pub fn scan(text: &'d str) -> Self {
        let mut markers = Markers::default();
        let mut instructions = Vec::new();
        let mut marker_changes = Vec::new();
        // Byte offset where the current token's body starts, and its canonical marker.
        let mut current: Option<(usize, char)> = None;
        let mut chars = text.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            if c == '\n' || c == '\r' {
                if let Some((s, marker)) = current.take() {
                    push_token(&mut instructions, marker, &text[s..i]);
                }
                continue;
            }
            if c != markers.caret && c != markers.tilde {
                continue;
            }

            if let Some((s, marker)) = current.take() {
                push_token(&mut instructions, marker, &text[s..i]);
            }
            let marker = if c == markers.caret { '^' } else { '~' };
            let body_start = i + c.len_utf8();

            let head: String = chars
                .clone()
                .take(2)
                .map(|(_, h)| h.to_ascii_uppercase())
                .collect();
            let target = match head.as_str() {
                "CC" => Some(&mut markers.caret),
                "CT" => Some(&mut markers.tilde),
                _ => None,
            };
            let Some(target) = target else {
                current = Some((body_start, marker));
                continue;
            };

            // Marker changes take exactly one parameter character.
            chars.next();
            chars.next();
            let instruction = format!("{}{}", marker, head);
            match chars.peek().copied() {
                Some((_, to)) if !to.is_whitespace() => {
                    chars.next();
                    marker_changes.push(MarkerChange {
                        instruction: instruction.clone(),
                        from: *target,
                        to,
                    });
                    *target = to;
                    instructions.push(format!("{}{}", instruction, to));
                }
                _ => instructions.push(instruction),
            }
        }
        if let Some((s, marker)) = current {
            push_token(&mut instructions, marker, &text[s..]);
        }

        Self { text, instructions, marker_changes }
    }
}

fn push_token(out: &mut Vec<String>, marker: char, body: &str) {
    let body = body.trim_end();
    if !body.is_empty() {
        out.push(format!("{}{}", marker, body));
    }
}

fn starts_with_ignore_case(token: &str, prefix: &str) -> bool {
    token.len() >= prefix.len()
        && token.is_char_boundary(prefix.len())
        && token[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Marker plus the two-character command name, e.g. `^FO`.
fn command_head(token: &str) -> String {
    token.chars().take(3).collect::<String>().to_ascii_uppercase()
}

/// Validation rule trait - produces findings
pub trait SafetyRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, doc: &ScannedDocument<'_>, policy: &ValidatorPolicy) -> Vec<Finding>;
}

// --- Concrete Rules ---

pub struct DangerousInstructionRule;

impl DangerousInstructionRule {
    fn risk_of(prefix: &str) -> &'static str {
        match prefix.to_ascii_uppercase().as_str() {
            "^RFW" => "RFID write without a present/compatible tag can corrupt media (VOID)",
            "^RFR" => "RFID read-then-write cycle can corrupt media when no compatible tag is under the head (VOID)",
            "^RFI" => "RFID tag info query drives the encoder and can void the label",
            "^RFT" => "RFID test cycle drives the encoder and can void the label",
            "^RFU" => "RFID user-memory write can corrupt media when the word count is wrong (VOID)",
            _ => "RFID instruction can corrupt media when no compatible tag is under the head",
        }
    }
}

impl SafetyRule for DangerousInstructionRule {
    fn name(&self) -> &'static str { "dangerous_instruction" }

    fn check(&self, doc: &ScannedDocument<'_>, policy: &ValidatorPolicy) -> Vec<Finding> {
        let mut findings: Vec<Finding> = Vec::new();

        for token in &doc.instructions {
            let Some(prefix) = policy
                .dangerous_instruction_prefixes
                .iter()
                .find(|p| starts_with_ignore_case(token, p))
            else {
                continue;
            };
            if findings.iter().any(|f| f.instruction.as_deref() == Some(prefix.as_str())) {
                continue;
            }
            findings.push(Finding {
                rule: self.name().to_string(),
                severity: FindingSeverity::Block,
                message: format!("{}: {}", prefix, Self::risk_of(prefix)),
                instruction: Some(prefix.clone()),
                remediation: vec![
                    "Remove the RFID instruction and print the visual label only".to_string(),
                    "Encode tags from a verified encoder profile instead of raw commands".to_string(),
                ],
            });
        }
        findings
    }
}

pub struct EmptyDocumentRule;

impl SafetyRule for EmptyDocumentRule {
    fn name(&self) -> &'static str { "empty_document" }

    fn check(&self, doc: &ScannedDocument<'_>, _policy: &ValidatorPolicy) -> Vec<Finding> {
        if !doc.text.trim().is_empty() {
            return vec![];
        }
        vec![Finding {
            rule: self.name().to_string(),
            severity: FindingSeverity::Risk,
            message: "Document is empty".to_string(),
            instruction: None,
            remediation: vec!["Check the template resource was loaded".to_string()],
        }]
    }
}

pub struct BracketingRule;

impl SafetyRule for BracketingRule {
    fn name(&self) -> &'static str { "bracketing" }

    fn check(&self, doc: &ScannedDocument<'_>, policy: &ValidatorPolicy) -> Vec<Finding> {
        let start = &policy.start_instruction;
        let end = &policy.end_instruction;
        let first_start = doc.instructions.iter().position(|t| starts_with_ignore_case(t, start));
        let last_end = doc.instructions.iter().rposition(|t| starts_with_ignore_case(t, end));

        let message = match (first_start, last_end) {
            (None, None) => format!("Missing {} and {} bracketing", start, end),
            (None, Some(_)) => format!("Missing start instruction {}", start),
            (Some(_), None) => format!("Missing end instruction {}", end),
            (Some(s), Some(e)) if e < s => format!("{} appears after the last {}", start, end),
            _ => return vec![],
        };

        vec![Finding {
            rule: self.name().to_string(),
            severity: FindingSeverity::Risk,
            message,
            instruction: None,
            remediation: vec![format!("Wrap the label format in {} ... {}", start, end)],
        }]
    }
}

/// Flags any switch of the command prefix away from `^` / `~`. The scanner
/// already follows the switch, so this only makes the change visible.
pub struct MarkerChangeRule;

impl SafetyRule for MarkerChangeRule {
    fn name(&self) -> &'static str { "marker_change" }

    fn check(&self, doc: &ScannedDocument<'_>, _policy: &ValidatorPolicy) -> Vec<Finding> {
        doc.marker_changes
            .iter()
            .filter(|change| !change.restores_default())
            .map(|change| Finding {
                rule: self.name().to_string(),
                severity: FindingSeverity::Risk,
                message: format!(
                    "{} switches the command prefix '{}' to '{}'",
                    change.instruction, change.from, change.to
                ),
                instruction: Some(change.instruction.clone()),
                remediation: vec!["Keep the default ^ and ~ command prefixes".to_string()],
            })
            .collect()
    }
}

pub struct LengthRule;

impl SafetyRule for LengthRule {
    fn name(&self) -> &'static str { "length" }

    fn check(&self, doc: &ScannedDocument<'_>, policy: &ValidatorPolicy) -> Vec<Finding> {
        if doc.text.len() <= policy.max_document_length {
            return vec![];
        }
        vec![Finding {
            rule: self.name().to_string(),
            severity: FindingSeverity::Risk,
            message: format!(
                "Document is {} bytes, limit is {}",
                doc.text.len(),
                policy.max_document_length
            ),
            instruction: None,
            remediation: vec!["Split the batch or simplify the template".to_string()],
        }]
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    policy: ValidatorPolicy,
    rules: Vec<Box<dyn SafetyRule>>,
}

impl Validator {
    pub fn new(policy: ValidatorPolicy) -> Self {
        Self {
            policy,
            rules: vec![
                Box::new(DangerousInstructionRule),
                Box::new(EmptyDocumentRule),
                Box::new(BracketingRule),
                Box::new(MarkerChangeRule),
                Box::new(LengthRule),
            ],
        }
    }

    pub fn policy(&self) -> &ValidatorPolicy {
        &self.policy
    }

    pub fn validate(&self, document: &str) -> ValidationResult {
        let doc = ScannedDocument::scan(document);

        let findings: Vec<Finding> = self
            .rules
            .iter()
            .flat_map(|rule| rule.check(&doc, &self.policy))
            .collect();

        let blocked: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.severity == FindingSeverity::Block)
            .collect();

        let (safety_level, reason) = if !blocked.is_empty() {
            let reasons: Vec<_> = blocked.iter().map(|f| f.message.as_str()).collect();
            (SafetyLevel::Blocked, format!("BLOCKED: {}", reasons.join("; ")))
        } else if !findings.is_empty() {
            let reasons: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
            (SafetyLevel::Risky, format!("RISKY: {}", reasons.join("; ")))
        } else {
            (
                SafetyLevel::Safe,
                format!(
                    "SAFE: no RFID instructions, bracketed by {}/{}",
                    self.policy.start_instruction, self.policy.end_instruction
                ),
            )
        };

        let matched_risky_instructions: Vec<String> = blocked
            .iter()
            .filter_map(|f| f.instruction.clone())
            .collect();

        if safety_level == SafetyLevel::Blocked {
            warn!(instructions = ?matched_risky_instructions, "document blocked");
        }

        ValidationResult {
            safety_level,
            void_risk: safety_level == SafetyLevel::Blocked,
            matched_risky_instructions,
            reason,
            findings,
            unrecognized_instructions: self.unrecognized(&doc),
            instruction_count: doc.instructions.len(),
            document_length: document.len(),
        }
    }

    fn unrecognized(&self, doc: &ScannedDocument<'_>) -> Vec<String> {
        let known = |t: &str| {
            self.policy
                .safe_instruction_prefixes
                .iter()
                .chain(&self.policy.dangerous_instruction_prefixes)
                .any(|p| starts_with_ignore_case(t, p))
        };
        let mut out: Vec<String> = Vec::new();
        for token in doc.instructions.iter().filter(|t| !known(t.as_str())) {
            let head = command_head(token);
            if !out.contains(&head) {
                out.push(head);
            }
        }
        out
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidatorPolicy::default())
    }
}
