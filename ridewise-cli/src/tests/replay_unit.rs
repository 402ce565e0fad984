//! Unit tests for the replay command.

use super::helpers::{workspace, write_feed, write_utf8};
use super::*;
use crate::replay::{ReplayConfig, config_from_layers_for_test, read_feed, run_replay_with};
use ortho_config::MergeComposer;
use ridewise_core::LatLng;
use ridewise_service::{ConfigError, EngineConfig};
use rstest::rstest;
use serde_json::{Value, json};

fn config(feed: camino::Utf8PathBuf, radius_km: f64) -> ReplayConfig {
    ReplayConfig {
        feed,
        center: LatLng::new(9.0054, 38.7636).expect("valid centre"),
        radius_km,
        stale_after_ms: None,
        engine: EngineConfig::default(),
    }
}

fn listed_ids(output: &Value) -> Vec<&str> {
    output
        .as_array()
        .expect("array output")
        .iter()
        .filter_map(|record| record["vehicleId"].as_str())
        .collect()
}

fn replay(config: &ReplayConfig) -> Value {
    let mut stdout = Vec::new();
    run_replay_with(config, &mut stdout).expect("replay succeeds");
    serde_json::from_slice(&stdout).expect("output is JSON")
}

#[rstest]
fn replay_lists_nearby_vehicles_nearest_first() {
    let (_tmp, root) = workspace();
    let output = replay(&config(write_feed(&root), 1.0));

    assert_eq!(listed_ids(&output), ["V1", "V2"]);
    assert_eq!(output[0]["distanceKm"], json!(0.0));
    assert_eq!(output[0]["timestampMs"], json!(1000));
}

#[rstest]
fn stale_window_is_measured_from_newest_report() {
    let (_tmp, root) = workspace();
    let feed = root.join("silent.ndjson");
    write_utf8(
        &feed,
        concat!(
            r#"{"vehicleId":"V1","routeId":"R1","lat":9.0054,"lng":38.7636,"timestampMs":1000}"#,
            "\n",
            r#"{"vehicleId":"V2","routeId":"R2","lat":9.0100,"lng":38.7610,"timestampMs":200000}"#,
            "\n",
        )
        .as_bytes(),
    );

    let mut filtered = config(feed.clone(), 1.0);
    filtered.stale_after_ms = Some(60_000);
    assert_eq!(listed_ids(&replay(&filtered)), ["V2"]);
    assert_eq!(listed_ids(&replay(&config(feed, 1.0))), ["V1", "V2"]);
}

#[rstest]
fn engine_settings_come_from_layers() {
    let mut composer = MergeComposer::new();
    composer.push_file(
        json!({ "feed": "f.ndjson", "lat": 9.0, "lng": 38.7, "utc_offset_minutes": 180 }),
        None,
    );
    composer.push_cli(json!({ "stale_after_ms": 30_000 }));

    let config = config_from_layers_for_test(composer.layers()).expect("merged config");
    assert_eq!(config.stale_after_ms, Some(30_000));
    assert_eq!(config.engine.stale_after_ms, 30_000);
    assert_eq!(config.engine.utc_offset_minutes, 180);
}

#[rstest]
#[case(json!({ "utc_offset_minutes": 900 }))]
#[case(json!({ "stale_after_ms": 0 }))]
fn invalid_engine_settings_are_rejected(#[case] overrides: Value) {
    let mut composer = MergeComposer::new();
    composer.push_file(json!({ "feed": "f.ndjson", "lat": 9.0, "lng": 38.7 }), None);
    composer.push_cli(overrides);

    let err = config_from_layers_for_test(composer.layers()).expect_err("invalid setting");
    assert!(
        matches!(
            err,
            CliError::Engine(ConfigError::UtcOffset(_) | ConfigError::Zero { .. })
        ),
        "unexpected {err:?}"
    );
}

#[rstest]
fn zero_radius_lists_nothing() {
    let (_tmp, root) = workspace();
    assert_eq!(replay(&config(write_feed(&root), 0.0)), json!([]));
}

#[rstest]
fn negative_radius_is_rejected() {
    let (_tmp, root) = workspace();
    let mut stdout = Vec::new();
    let err = run_replay_with(&config(write_feed(&root), -1.0), &mut stdout)
        .expect_err("negative radius");
    assert!(matches!(err, CliError::Query(_)), "unexpected {err:?}");
    assert!(stdout.is_empty());
}

#[rstest]
fn missing_feed_reports_open_error() {
    let (_tmp, root) = workspace();
    let feed = root.join("absent.ndjson");
    let err = read_feed(&feed).expect_err("feed is absent");
    match err {
        CliError::OpenFeed { path, .. } => assert_eq!(path, feed),
        other => panic!("expected OpenFeed, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_maps_configuration_errors() {
    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "lat": "north" }));

    let err = config_from_layers_for_test(composer.layers())
        .expect_err("invalid layer should map to CliError::Configuration");
    assert!(matches!(err, CliError::Configuration(_)), "unexpected {err:?}");
}

#[rstest]
fn merge_layers_honours_precedence_and_defaults_radius() {
    let mut composer = MergeComposer::new();
    composer.push_file(json!({ "feed": "from-file.ndjson", "lat": 1.0, "lng": 2.0 }), None);
    composer.push_environment(json!({ "feed": "from-env.ndjson", "lat": 9.0 }));
    composer.push_cli(json!({ "lng": 38.75 }));

    let config = config_from_layers_for_test(composer.layers()).expect("merged config");
    assert_eq!(config.feed.as_str(), "from-env.ndjson");
    assert_eq!(config.center, LatLng::new(9.0, 38.75).expect("valid"));
    assert_eq!(config.radius_km, 1.0);
}

#[rstest]
#[case(json!({ "lat": 9.0, "lng": 38.7 }), ARG_FEED, ENV_FEED)]
#[case(json!({ "feed": "f.ndjson", "lng": 38.7 }), ARG_LAT, ENV_LAT)]
#[case(json!({ "feed": "f.ndjson", "lat": 9.0 }), ARG_LNG, ENV_LNG)]
fn missing_values_name_flag_and_variable(
    #[case] layer: Value,
    #[case] expected_field: &str,
    #[case] expected_env: &str,
) {
    let mut composer = MergeComposer::new();
    composer.push_cli(layer);

    let err = config_from_layers_for_test(composer.layers()).expect_err("value missing");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, expected_field);
            assert_eq!(env, expected_env);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn out_of_range_query_point_is_rejected() {
    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "feed": "f.ndjson", "lat": 95.0, "lng": 38.7 }));

    let err = config_from_layers_for_test(composer.layers()).expect_err("latitude too large");
    assert!(matches!(err, CliError::InvalidCoordinate(_)), "unexpected {err:?}");
}

#[rstest]
fn cli_parses_replay_flags() {
    let cli = Cli::try_parse_from([
        "ridewise", "-v", "replay", "feed.ndjson", "--lat", "-9.5", "--lng", "38.7",
        "--radius-km", "2.5", "--utc-offset-minutes", "-300", "--stale-after-ms", "5000",
    ])
    .expect("arguments parse");
    assert!(cli.verbose);
    let Command::Replay(args) = cli.command;
    assert_eq!(args.feed.as_ref().map(|path| path.as_str()), Some("feed.ndjson"));
    assert_eq!(args.lat, Some(-9.5));
    assert_eq!(args.radius_km, Some(2.5));
    assert_eq!(args.utc_offset_minutes, Some(-300));
    assert_eq!(args.stale_after_ms, Some(5_000));
}
