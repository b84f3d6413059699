//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::collections::HashSet;

use labelforge_core::{
    config::EngineConfig,
    pipeline::RejectionKind,
    sequence::{expand, SequenceError},
    templates::render,
    FieldValues, PipelineError, ProductRecord, RenderPipeline, RfidSuffixPolicy, SafetyLevel,
    TemplateDocument, Validator,
};

const LABEL_TEMPLATE: &str = "^XA
^CI28
^PW831
^LL320
^FO50,30^A0N,30,30^FD{STYLE_NAME}^FS
^FO50,70^A0N,22,22^FDVPN: {VPM}^FS
^FO50,100^A0N,22,22^FDCOLOR: {COLOR}^FS
^FO50,130^A0N,22,22^FDSIZE: {SIZE}^FS
^FO50,160^A0N,18,18^FD{PO_INFO} {LOCAL_INFO}^FS
^FO50,200^BY2^BCN,60,Y,N,N^FD{BARCODE}^FS
^FO600,30^BQN,2,3^FDMM,A{QR_DATA_1}^FS
^FO600,130^BQN,2,3^FDMM,A{QR_DATA_2}^FS
^FO700,230^BQN,2,3^FDMM,A{QR_DATA_3}^FS
^XZ";

fn reference_record() -> ProductRecord {
    serde_json::from_value(serde_json::json!({
        "STYLE_NAME": "JASMINE",
        "VPM": "L458-JASM-11.0-SILV-1885",
        "COLOR": "SILVER",
        "SIZE": "11.0",
        "BARCODE": null,
        "QTY": 3
    }))
    .unwrap()
}

fn template() -> TemplateDocument {
    TemplateDocument::new("larroude-3qr", LABEL_TEMPLATE)
}

#[test]
fn invariant_reference_record_scenario() {
    let pipeline = RenderPipeline::default();
    let record = reference_record();

    let ids = pipeline.derive(&record).unwrap();
    assert_eq!(ids.po_digits, "458");
    assert_eq!(ids.base_barcode.len(), 12);
    assert!(ids.base_barcode.chars().all(|c| c.is_ascii_digit()));

    let outcomes = pipeline.process(&record, &template()).unwrap();
    assert_eq!(outcomes.len(), 3);

    let payloads: Vec<&str> = outcomes.iter().map(|o| o.instance.rfid_payload.as_str()).collect();
    // Only the embedded sequence digit differs.
    let prefix_len = ids.base_barcode.len() + ids.po_digits.len();
    for (i, payload) in payloads.iter().enumerate() {
        assert_eq!(&payload[..prefix_len], format!("{}{}", ids.base_barcode, ids.po_digits));
        assert_eq!(&payload[prefix_len..prefix_len + 1], (i + 1).to_string());
        assert_eq!(&payload[prefix_len + 1..], "00000000");
    }
    assert!(outcomes.iter().all(|o| o.accepted_for_dispatch));
}

#[test]
fn invariant_every_label_gets_its_own_payload_in_all_qr_codes() {
    let outcomes = RenderPipeline::default().process(&reference_record(), &template()).unwrap();
    for outcome in &outcomes {
        let doc = &outcome.rendered.as_ref().unwrap().document;
        let expected = format!("^FDMM,A{}^FS", outcome.instance.rfid_payload);
        assert_eq!(doc.matches(&expected).count(), 3);
        assert!(!doc.contains('{'));
    }
}

#[test]
fn invariant_rfw_template_is_blocked() {
    let validator = Validator::default();
    let doc = render(
        &TemplateDocument::new("rfid", "^XA\n^RFW,H^FD{RFID_DATA}^FS\n^XZ"),
        &[("RFID_DATA", "004581101885458100000000")].into_iter().collect::<FieldValues>(),
    )
    .unwrap();
    let result = validator.validate(&doc);
    assert_eq!(result.safety_level, SafetyLevel::Blocked);
    assert_eq!(result.matched_risky_instructions, vec!["^RFW".to_string()]);
}

#[test]
fn invariant_blocked_labels_never_accepted() {
    let mut config = EngineConfig::default();
    config.dispatch.accept_risky = true;
    let pipeline = RenderPipeline::new(config).unwrap();
    let rfid_template = TemplateDocument::new(
        "zebra-designer",
        format!("{}\n^RFW,H,2,12,1^FD{{RFID_DATA}}^FS", LABEL_TEMPLATE.trim_end_matches("^XZ"))
            + "\n^XZ",
    );

    let outcomes = pipeline.process(&reference_record(), &rfid_template).unwrap();
    assert_eq!(outcomes.len(), 3);
    for outcome in outcomes {
        assert!(!outcome.accepted_for_dispatch);
        assert_eq!(outcome.rejection, Some(RejectionKind::BlockedByValidator));
        assert!(outcome.reason.contains("^RFW"));
    }
}

#[test]
fn invariant_safe_template_is_safe() {
    let outcomes = RenderPipeline::default().process(&reference_record(), &template()).unwrap();
    for outcome in outcomes {
        let validation = outcome.rendered.unwrap().validation;
        assert_eq!(validation.safety_level, SafetyLevel::Safe);
        assert!(validation.matched_risky_instructions.is_empty());
    }
}

#[test]
fn invariant_quantity_bounds() {
    let pipeline = RenderPipeline::default();
    for qty in [0, 1000] {
        let record = reference_record().with_quantity(qty);
        let err = pipeline.process(&record, &template()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Sequence(SequenceError::InvalidQuantity { requested, .. }) if requested == qty
        ));
    }
}

#[test]
fn invariant_missing_field_rejects_label_not_batch() {
    let pipeline = RenderPipeline::default();
    let template = TemplateDocument::new("legacy", "^XA^FD{BARCODE}^FS^FD{RFID_DATA_ASCII}^FS^XZ");
    let outcomes = pipeline.process(&reference_record(), &template).unwrap();
    assert_eq!(outcomes.len(), 3);
    for outcome in outcomes {
        assert_eq!(outcome.rejection, Some(RejectionKind::UnresolvedPlaceholder));
        assert!(outcome.reason.contains("{RFID_DATA_ASCII}"));
    }
}

#[test]
fn invariant_payload_width_constant_across_batch() {
    let pipeline = RenderPipeline::default();
    let record = reference_record().with_quantity(25);
    let outcomes = pipeline.process(&record, &template()).unwrap();
    let widths: HashSet<usize> = outcomes.iter().map(|o| o.instance.barcode_payload.len()).collect();
    assert_eq!(widths.len(), 1);
    let payloads: HashSet<&str> = outcomes.iter().map(|o| o.instance.rfid_payload.as_str()).collect();
    assert_eq!(payloads.len(), 25);
}

#[test]
fn invariant_numeric_barcode_override() {
    let record: ProductRecord = serde_json::from_value(serde_json::json!({
        "VPM": "L0464-HANA-5.0-WHIT-1120",
        "BARCODE": 197416145132u64,
        "QTY": "2"
    }))
    .unwrap();
    let outcomes = RenderPipeline::default().process(&record, &template()).unwrap();
    assert_eq!(outcomes[0].instance.rfid_payload, "1974161451320464100000000");
    assert_eq!(outcomes[1].instance.barcode_payload, "19741614513204642");
}

#[test]
fn invariant_zebra_designer_policy_from_config() {
    let config = EngineConfig::from_json(
        r#"{"sequence": {"rfidSuffix": {"kind": "padToLength", "target": 24}}}"#,
    )
    .unwrap();
    assert_eq!(config.sequence.rfid_suffix, RfidSuffixPolicy::PadToLength { target: 24 });
    let pipeline = RenderPipeline::new(config).unwrap();
    let outcomes = pipeline.process(&reference_record(), &template()).unwrap();
    assert!(outcomes.iter().all(|o| o.instance.rfid_payload.len() == 24));
}

#[test]
fn invariant_re_expansion_identical() {
    let pipeline = RenderPipeline::default();
    let ids = pipeline.derive(&reference_record()).unwrap();
    let policy = &pipeline.config().sequence;
    let a: Vec<_> = expand(&ids, 7, policy).unwrap().collect();
    let b: Vec<_> = expand(&ids, 7, policy).unwrap().collect();
    assert_eq!(a, b);
}

#[test]
fn invariant_rendering_is_idempotent() {
    let pipeline = RenderPipeline::default();
    let a = pipeline.process(&reference_record(), &template()).unwrap();
    let b = pipeline.process(&reference_record(), &template()).unwrap();
    for (x, y) in a.iter().zip(&b) {
        let (x, y) = (x.rendered.as_ref().unwrap(), y.rendered.as_ref().unwrap());
        assert_eq!(x.document, y.document);
        assert_eq!(x.document_hash, y.document_hash);
    }
}

#[test]
fn invariant_field_values_cannot_inject_instructions() {
    let mut config = EngineConfig::default();
    config.dispatch.accept_risky = true;
    let pipeline = RenderPipeline::new(config).unwrap();
    let record = ProductRecord::new(
        "JAS^FS^CC!!RFW,H!FD1!FS!CC^^FDMINE",
        "L458-JASM-11.0-SILV-1885",
        "SILVER",
        "11.0",
    );

    let outcomes = pipeline.process(&record, &template()).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].accepted_for_dispatch);
    assert_eq!(outcomes[0].rejection, Some(RejectionKind::ControlCharacterInField));
    assert!(outcomes[0].reason.contains("STYLE_NAME"));
    assert!(outcomes[0].rendered.is_none());
}

#[test]
fn invariant_switched_caret_cannot_hide_rfid_write() {
    let result = Validator::default().validate("^XA\n~CC!\n!RFW,H!FD1!FS\n~CC^\n^XZ");
    assert_eq!(result.safety_level, SafetyLevel::Blocked);
    assert!(result.void_risk);
    assert_eq!(result.matched_risky_instructions, vec!["^RFW".to_string()]);

    // Same payload with the switch inside a bracketed label.
    let result = Validator::default()
        .validate("^XA^FDJAS^FS^CC!!RFW,H!FD1!FS!CC^^FDMINE^FS^XZ");
    assert_eq!(result.safety_level, SafetyLevel::Blocked);
}
