//! Shared test harness modules for the ridewise CLI.

use super::*;

mod helpers;
mod replay_steps;
mod replay_unit;
