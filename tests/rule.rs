use rule_audit::dataset::Dataset;
use rule_audit::engine::Auditor;
use rule_audit::report;
use rule_audit::rule::{MetricStatus, RuleStatus, Severity, rules_from_json};

const MAPPED_RULES: &str = r#"[
  {
    "rule_id": "Rule 3.3",
    "title": "Ultra-High Transaction Alert",
    "severity": "CRITICAL",
    "status": "READY",
    "predicate": "amount >= 1000000",
    "columns_remapped": ["amount -> Amount Paid", "timestamp -> Timestamp"]
  },
  {
    "rule_id": "Rule 4.1",
    "title": "Receiver concentration",
    "severity": "medium",
    "status": "READY",
    "predicate": "amount > 0",
    "columns_remapped": [["sender_account", "To_Account"]]
  },
  {
    "rule_id": "Rule 5.2",
    "title": "Unmappable rule"
  }
]"#;

#[test]
fn mapped_rule_records_parse_loosely() {
    let rules = rules_from_json(MAPPED_RULES).expect("parse");
    assert_eq!(rules.len(), 3);

    assert_eq!(rules[0].severity, Severity::Critical);
    assert!(rules[0].is_executable());
    let pairs: Vec<(String, String)> = rules[0].remapped_pairs().collect();
    assert_eq!(
        pairs,
        vec![
            ("amount".to_string(), "Amount Paid".to_string()),
            ("timestamp".to_string(), "Timestamp".to_string()),
        ]
    );

    // Lowercase severity text still canonicalizes; pair-shaped remaps parse.
    assert_eq!(rules[1].severity, Severity::Medium);
    let pairs: Vec<(String, String)> = rules[1].remapped_pairs().collect();
    assert_eq!(
        pairs,
        vec![("sender_account".to_string(), "To_Account".to_string())]
    );

    // Absent status and predicate leave the rule structurally skipped.
    assert_eq!(rules[2].status, RuleStatus::Unknown);
    assert_eq!(rules[2].severity, Severity::Low);
    assert!(!rules[2].is_executable());
}

#[test]
fn malformed_rule_json_is_an_error() {
    assert!(rules_from_json("not json").is_err());
    assert!(rules_from_json(r#"[{"title": "missing id"}]"#).is_err());
}

#[test]
fn report_json_is_compact_and_ordered() {
    let auditor = Auditor::new(
        Dataset::from_csv_reader(
            "txn_ref,From_Account,amount\nT1,ACC-1,2000000\nT2,ACC-2,5\n".as_bytes(),
            b',',
        )
        .expect("dataset"),
    );
    let rules = rules_from_json(
        r#"[
          {"rule_id":"R1","title":"Huge","severity":"CRITICAL","status":"READY","predicate":"amount >= 1000000"},
          {"rule_id":"R2","title":"Dropped","severity":"LOW","status":"SKIPPED"}
        ]"#,
    )
    .expect("parse");
    let metrics = auditor.run_all(&rules).expect("run");
    let rendered = report::render_json(&metrics).expect("render");

    // Compact separators, one object per rule, input order preserved.
    assert!(rendered.starts_with("[{\"rule_id\":\"R1\""));
    assert!(!rendered.contains(": "));
    assert!(rendered.contains("\"status\":\"FLAGGED\""));
    assert!(rendered.contains("\"status\":\"SKIPPED\""));
    assert!(rendered.contains("\"sample_offending_row\":[{"));
    assert!(rendered.find("\"R1\"").unwrap() < rendered.find("\"R2\"").unwrap());

    // The rendered report round-trips into the same metric shapes.
    let parsed: Vec<rule_audit::rule::RuleMetric> =
        serde_json::from_str(&rendered).expect("round trip");
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].status, MetricStatus::Flagged);
    assert_eq!(parsed[0].total_amount_exposure, 2_000_000.0);
    assert_eq!(parsed[1].status, MetricStatus::Skipped);
}

#[test]
fn error_status_carries_message_text() {
    let auditor = Auditor::new(
        Dataset::from_csv_reader("amount\n10\n".as_bytes(), b',').expect("dataset"),
    );
    let rules = rules_from_json(
        r#"[{"rule_id":"R1","title":"Bad","severity":"HIGH","status":"READY","predicate":"ghost > 1"}]"#,
    )
    .expect("parse");
    let metrics = auditor.run_all(&rules).expect("run");
    let rendered = report::render_json(&metrics).expect("render");
    assert!(rendered.contains("\"status\":\"ERROR: "));
}
