//! Behaviour-driven step definitions driving the replay CLI scenarios.

use super::helpers::{workspace, write_feed};
use super::*;
use crate::replay::run_replay;
use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use tempfile::TempDir;

#[derive(Debug)]
struct ReplayWorld {
    _tmp: TempDir,
    root: Utf8PathBuf,
    feed_path: RefCell<Option<Utf8PathBuf>>,
    stdout: RefCell<Vec<u8>>,
    result: RefCell<Option<Result<(), CliError>>>,
}

impl ReplayWorld {
    fn new() -> Self {
        let (tmp, root) = workspace();
        Self {
            _tmp: tmp,
            root,
            feed_path: RefCell::new(None),
            stdout: RefCell::new(Vec::new()),
            result: RefCell::new(None),
        }
    }

    fn build_command_line(&self) -> Vec<String> {
        let mut argv = vec!["ridewise".to_owned(), "replay".to_owned()];
        if let Some(path) = self.feed_path.borrow().as_ref() {
            argv.push(path.as_str().to_owned());
        }
        argv.extend(
            [
                format!("--{ARG_LAT}"),
                "9.0054".to_owned(),
                format!("--{ARG_LNG}"),
                "38.7636".to_owned(),
                format!("--{ARG_RADIUS_KM}"),
                "1".to_owned(),
            ],
        );
        argv
    }
}

#[fixture]
fn world() -> ReplayWorld {
    ReplayWorld::new()
}

#[given("a recorded position feed exists on disk")]
fn feed_exists(#[from(world)] world: &ReplayWorld) {
    let path = write_feed(&world.root);
    world.feed_path.replace(Some(path));
}

#[given("I omit the feed path")]
fn omit_feed_path(#[from(world)] world: &ReplayWorld) {
    world.feed_path.replace(None);
}

#[when("I replay the feed around central Addis Ababa")]
fn replay_feed(#[from(world)] world: &ReplayWorld) {
    let invocation = world.build_command_line();
    let parsed = Cli::try_parse_from(invocation).map_err(CliError::from);
    let outcome = parsed.and_then(|cli| match cli.command {
        Command::Replay(args) => {
            let mut buffer = world.stdout.borrow_mut();
            run_replay(args, &mut *buffer)
        }
    });
    world.result.replace(Some(outcome));
}

#[then("the command succeeds and lists vehicles V1 and V2")]
fn lists_nearby(#[from(world)] world: &ReplayWorld) {
    let borrowed = world.result.borrow();
    borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect("expected success");

    let output: serde_json::Value =
        serde_json::from_slice(&world.stdout.borrow()).expect("output should be JSON");
    let ids: Vec<&str> = output
        .as_array()
        .expect("array output")
        .iter()
        .filter_map(|record| record["vehicleId"].as_str())
        .collect();
    assert_eq!(ids, ["V1", "V2"]);
}

#[then("the command fails because the feed path is missing")]
fn fails_missing_feed(#[from(world)] world: &ReplayWorld) {
    let borrowed = world.result.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected error");
    match error {
        CliError::MissingArgument { field, env } => {
            assert_eq!(*field, ARG_FEED);
            assert_eq!(*env, ENV_FEED);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

macro_rules! register_replay_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/replay_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: ReplayWorld) {
            let _ = world;
        }
    };
}

register_replay_scenario!(replay_happy_path, "replaying a feed lists nearby vehicles");
register_replay_scenario!(replay_missing_feed, "rejecting a replay without a feed path");
