//! End-to-end script runs: record commands, variables, dispatch errors and
//! the failure policy.

mod helpers;

use helpers::TestEnv;
use pretty_assertions::assert_eq;
use serde_json::json;

use dexscript::ScriptError;

#[tokio::test]
async fn test_create_delete_then_view_is_not_found() {
    let env = TestEnv::new();

    let report = env
        .run("CREATE > BALL > Spain\nDELETE > BALL > Spain\nVIEW > BALL > Spain")
        .await;

    assert_eq!(
        report.messages(),
        vec!["Created `Spain`", "Deleted `Spain`"]
    );
    let error = report.error.expect("VIEW should fail");
    assert_eq!(error.line, 3);
    assert_eq!(error.command.as_deref(), Some("VIEW"));
    assert!(matches!(error.error, ScriptError::NotFound { .. }));
    assert!(env.host.last_text().starts_with("'Spain' does not exist."));
    assert_eq!(env.count("Ball").await, 3);
}

#[tokio::test]
async fn test_create_fills_default_payload() {
    let env = TestEnv::new();

    env.run_ok("CREATE > BALL > Spain").await;

    let record = env.record("Ball", "Spain").await.expect("Spain was created");
    assert_eq!(record.get("country"), Some(&json!("Spain")));
    assert_eq!(record.get("health"), Some(&json!(1)));
    assert_eq!(record.get("tradeable"), Some(&json!(true)));
    // first Regime record
    assert_eq!(record.get("regime"), Some(&json!(1)));
    assert_eq!(record.get("enabled"), None);
    assert_eq!(record.get("wild_card"), None);
    assert!(record.get("created_at").is_some());
    assert_eq!(env.host.acknowledged(), 1);
}

#[tokio::test]
async fn test_local_variable_feeds_update() {
    let env = TestEnv::new();

    let report = env
        .run_ok("LOCAL > hp > 50\nUPDATE > BALL > France > HEALTH > $hp\nVIEW > BALL > France > HEALTH")
        .await;

    assert_eq!(
        report.messages(),
        vec!["Updated `France`'s health to `50`", "50"]
    );
    assert_eq!(report.outcomes[0].command, None);

    let record = env.record("Ball", "France").await.unwrap();
    assert_eq!(record.get("health"), Some(&json!(50)));
}

#[tokio::test]
async fn test_locals_do_not_survive_the_run() {
    let env = TestEnv::new();

    env.run_ok("LOCAL > hp > 50").await;
    let report = env.run("UPDATE > BALL > France > HEALTH > $hp").await;

    let error = report.error.expect("hp is out of scope");
    assert!(matches!(error.error, ScriptError::UnknownVariable(ref name) if name == "hp"));
    assert_eq!(env.host.last_text(), "'hp' is an unknown variable.");

    let record = env.record("Ball", "France").await.unwrap();
    assert_eq!(record.get("health"), Some(&json!(40)));
}

#[tokio::test]
async fn test_globals_survive_the_run() {
    let env = TestEnv::new();

    env.run_ok("GLOBAL > hp > 75").await;
    env.run_ok("UPDATE > BALL > Germany > HEALTH > $hp").await;

    let record = env.record("Ball", "Germany").await.unwrap();
    assert_eq!(record.get("health"), Some(&json!(75)));
}

#[tokio::test]
async fn test_missing_argument_has_no_side_effects() {
    let env = TestEnv::new();

    let report = env.run("CREATE > BALL").await;

    let error = report.error.expect("CREATE needs an identifier");
    assert!(matches!(
        error.error,
        ScriptError::Arity {
            expected: 2,
            found: 1,
            ..
        }
    ));
    assert!(env.host.last_text().starts_with("Argument missing when calling 'CREATE'"));
    assert_eq!(env.count("Ball").await, 3);
    assert_eq!(env.host.acknowledged(), 0);
}

#[tokio::test]
async fn test_too_many_arguments() {
    let env = TestEnv::new();

    let report = env.run("DELETE > BALL > France > now").await;

    assert!(matches!(
        report.error.map(|e| e.error),
        Some(ScriptError::TooManyArguments { .. })
    ));
    assert!(env.record("Ball", "France").await.is_some());
}

#[tokio::test]
async fn test_fuzzy_identifier_suggestion() {
    let env = TestEnv::new();

    let report = env.run("VIEW > BALL > Fracne").await;

    assert!(report.error.is_some());
    assert_eq!(
        env.host.last_text(),
        "'Fracne' does not exist.\nDid you mean 'France'?"
    );
}

#[tokio::test]
async fn test_unknown_command_suggestion() {
    let env = TestEnv::new();

    let report = env.run("CRAETE > BALL > Spain").await;

    assert!(matches!(
        report.error.map(|e| e.error),
        Some(ScriptError::UnknownCommand { .. })
    ));
    assert_eq!(
        env.host.last_text(),
        "'CRAETE' is not a valid command.\nDid you mean 'CREATE'?"
    );
}

#[tokio::test]
async fn test_unknown_model() {
    let env = TestEnv::new();

    let report = env.run("VIEW > BAL > France").await;

    assert!(matches!(
        report.error.map(|e| e.error),
        Some(ScriptError::UnknownModel { .. })
    ));
    assert!(env.host.last_text().starts_with("'BAL' is not a valid model"));
}

#[tokio::test]
async fn test_first_failure_stops_the_run() {
    let env = TestEnv::new();

    let report = env
        .run("UPDATE > BALL > France > HEALTH > 10\nVIEW > BALL > Nowhere\nUPDATE > BALL > Italy > HEALTH > 10")
        .await;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.error.as_ref().map(|e| e.line), Some(2));

    let france = env.record("Ball", "France").await.unwrap();
    let italy = env.record("Ball", "Italy").await.unwrap();
    assert_eq!(france.get("health"), Some(&json!(10)));
    assert_eq!(italy.get("health"), Some(&json!(35)));
}

#[tokio::test]
async fn test_parse_error_runs_nothing() {
    let env = TestEnv::new();

    let report = env
        .run("UPDATE > BALL > France > HEALTH > 10\nVIEW > > France")
        .await;

    assert!(report.outcomes.is_empty());
    let error = report.error.expect("empty segment");
    assert_eq!(error.line, 2);
    assert!(matches!(error.error, ScriptError::Parse { line: 2, .. }));

    let france = env.record("Ball", "France").await.unwrap();
    assert_eq!(france.get("health"), Some(&json!(40)));
}

#[tokio::test]
async fn test_code_fence_and_comments_are_ignored() {
    let env = TestEnv::new();

    let script = "```py\n-- bump France\nUPDATE > BALL > France > HEALTH > 99\n\n// done\n```";
    let report = env.run_ok(script).await;

    assert_eq!(report.outcomes.len(), 1);
    let france = env.record("Ball", "France").await.unwrap();
    assert_eq!(france.get("health"), Some(&json!(99)));
}

#[tokio::test]
async fn test_type_checked_update() {
    let env = TestEnv::new();

    let report = env.run("UPDATE > BALL > France > HEALTH > lots").await;
    assert!(env.host.last_text().contains("'health' expects a whole number"));
    assert!(report.error.is_some());

    env.run_ok("UPDATE > BALL > France > TRADEABLE > false\nUPDATE > BALL > France > CREATED_AT > 2025-01-02")
        .await;
    let france = env.record("Ball", "France").await.unwrap();
    assert_eq!(france.get("tradeable"), Some(&json!(false)));
    assert_eq!(france.get("created_at"), Some(&json!("2025-01-02 00:00:00")));
}

#[tokio::test]
async fn test_foreign_key_update_by_identifier() {
    let env = TestEnv::new();

    env.run_ok("UPDATE > BALL > France > REGIME > Dictatorship").await;

    let france = env.record("Ball", "France").await.unwrap();
    assert_eq!(france.get("regime"), Some(&json!(2)));
}

#[tokio::test]
async fn test_unknown_field_points_to_attributes() {
    let env = TestEnv::new();

    env.run("UPDATE > BALL > France > SPEED > 3").await;

    assert_eq!(
        env.host.last_text(),
        "BALL has no field 'speed'\nRun `ATTRIBUTES > BALL` to list its fields."
    );
}

#[tokio::test]
async fn test_view_all_fields() {
    let env = TestEnv::new();

    let report = env.run_ok("VIEW > BALL > Italy").await;

    let text = report.messages()[0];
    assert!(text.starts_with("id: 3\n"));
    assert!(text.contains("country: Italy"));
    assert!(text.contains("health: 35"));
    assert!(text.contains("tradeable: false"));
}

#[tokio::test]
async fn test_attributes_lists_fields() {
    let env = TestEnv::new();

    let report = env.run_ok("ATTRIBUTES > BALL").await;

    let text = report.messages()[0];
    assert!(text.starts_with("BALL ATTRIBUTES:"));
    assert!(text.contains("- COUNTRY (char)"));
    assert!(text.contains("- REGIME (foreign_key)"));
    assert!(!text.contains("- ID"));
}

#[tokio::test]
async fn test_debug_setting_expands_errors() {
    let env = TestEnv::new();

    env.run_ok("SETTING > debug").await;
    env.run("VIEW > BALL > Nowhere").await;

    let text = env.host.last_text();
    assert!(text.starts_with("NotFoundError on line 1 (command: VIEW)"));
    assert!(text.contains("  | VIEW > BALL > Nowhere"));
    assert!(text.contains("NotFound {"));
}

#[tokio::test]
async fn test_media_update_saves_attachment() {
    let env = TestEnv::new();
    env.host.attach("flag.png", b"png-bytes");

    let report = env.run_ok("UPDATE > BALL > France > WILD_CARD").await;
    assert!(report.messages()[0].starts_with("Updated `France`'s wild_card to `/"));

    let france = env.record("Ball", "France").await.unwrap();
    let stored = france.get("wild_card").and_then(|v| v.as_str()).unwrap().to_string();
    assert!(stored.ends_with("flag.png"));

    env.host.reset();
    let report = env.run_ok("VIEW > BALL > France > WILD_CARD").await;
    assert_eq!(report.messages(), vec![stored.as_str()]);
    let replies = env.host.replies();
    assert_eq!(replies[0].attachments.len(), 1);
    assert_eq!(replies[0].attachments[0].data, b"png-bytes".to_vec());
}

#[tokio::test]
async fn test_identifiers_keep_the_written_text() {
    let env = TestEnv::new();

    let report = env
        .run_ok("CREATE > BALL > 007\nVIEW > BALL > 007 > HEALTH\nUPDATE > BALL > France > COUNTRY > 1e3")
        .await;

    assert_eq!(
        report.messages(),
        vec!["Created `007`", "1", "Updated `France`'s country to `1e3`"]
    );
    assert!(env.record("Ball", "007").await.is_some());
    assert!(env.record("Ball", "7").await.is_none());
    assert!(env.record("Ball", "1e3").await.is_some());
}

#[tokio::test]
async fn test_text_field_keeps_date_as_written() {
    let env = TestEnv::new();

    env.run_ok("UPDATE > BALL > Italy > WILD_CARD > 2024-1-1").await;

    let italy = env.record("Ball", "Italy").await.unwrap();
    assert_eq!(italy.get("wild_card"), Some(&json!("2024-1-1")));
}

#[tokio::test]
async fn test_create_rejected_for_key_named_models() {
    let env = TestEnv::new();

    let report = env.run("CREATE > TRADE > abc").await;

    assert!(report.error.is_some());
    assert!(env.host.last_text().contains("cannot be created by name"));
    assert_eq!(env.count("Trade").await, 0);
}
