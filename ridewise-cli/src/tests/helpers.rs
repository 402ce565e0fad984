//! Filesystem helpers shared by the CLI tests.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// Temporary workspace with a UTF-8 root.
pub(super) fn workspace() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf-8 workspace");
    (tmp, root)
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    fs::write(path, contents).expect("write file");
}

/// Feed of five reports around central Addis Ababa: one late, one malformed.
pub(super) const FEED: &str = concat!(
    r#"{"vehicleId":"V1","routeId":"R1","lat":9.0054,"lng":38.7636,"timestampMs":1000}"#,
    "\n",
    r#"{"vehicleId":"V2","routeId":"R2","lat":9.0100,"lng":38.7610,"timestampMs":1000}"#,
    "\n",
    "\n",
    r#"{"vehicleId":"V1","routeId":"R1","lat":9.5000,"lng":38.9000,"timestampMs":900}"#,
    "\n",
    "not json\n",
    r#"{"vehicleId":"V3","routeId":"R3","lat":9.1000,"lng":38.9000,"timestampMs":1000}"#,
    "\n",
);

pub(super) fn write_feed(root: &Utf8Path) -> Utf8PathBuf {
    let path = root.join("feed.ndjson");
    write_utf8(&path, FEED.as_bytes());
    path
}
