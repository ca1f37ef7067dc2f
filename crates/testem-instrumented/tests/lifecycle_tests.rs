//! End-to-end lifecycle tests
//!
//! External tools are stood in for by `sh` scripts, so these run on unix only.

#![cfg(unix)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use testem_instrumented::collector::is_fragment_file_name;
use testem_instrumented::{HarnessError, InstrumentedSession, RunConfig, ToolCommand};

const INSTRUMENT_OK: &str = r#"mkdir -p "$0" && cp -R "$1"/. "$0""#;

const REPORT_OK: &str = "mkdir -p coverage/lcov-report \
    && printf 'TN:\\nSF:src/js/app.js\\nDA:1,1\\nend_of_record\\n' > coverage/lcov.info \
    && echo '<a href=\"src/index.html\">src</a>' > coverage/lcov-report/index.html";

const REPORT_WITHOUT_RECORD: &str = "mkdir -p coverage/lcov-report \
    && printf 'TN:\\nSF:src/js/app.js\\n' > coverage/lcov.info \
    && echo '<a href=\"src/index.html\">src</a>' > coverage/lcov-report/index.html";

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let js = temp.path().join("src").join("js");
    fs::create_dir_all(&js).unwrap();
    fs::write(js.join("app.js"), "function add(a, b) { return a + b; }\n").unwrap();
    temp
}

fn config(root: &Path, instrument: &str, report: &str) -> RunConfig {
    RunConfig::new()
        .with_module_root(root)
        .with_coverage_port(0)
        .with_instrument_command(ToolCommand::new(
            "sh",
            ["-c", instrument, "{output}", "{source}"],
        ))
        .with_report_command(ToolCommand::new("sh", ["-c", report]))
}

fn fragments(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_fragment_file_name)
        })
        .collect()
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("0.0.0.0:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_full_run_collects_and_reports() {
    let temp = project();
    let resolved = config(temp.path(), INSTRUMENT_OK, REPORT_OK).resolve().unwrap();
    let mut session = InstrumentedSession::new(resolved);

    let addr = session.on_start().await.unwrap();
    assert!(temp.path().join("instrumented").join("js").join("app.js").is_file());

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/coverage", addr.port()))
        .body(r#"{"a":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let coverage_dir = temp.path().join("coverage");
    let files = fragments(&coverage_dir);
    assert_eq!(files.len(), 1);
    assert_eq!(fs::read_to_string(&files[0]).unwrap(), r#"{"a":1}"#);

    session.on_exit().await.unwrap();
    assert!(!session.is_collecting());
}

#[tokio::test]
async fn test_report_without_end_of_record_fails() {
    let temp = project();
    let resolved = config(temp.path(), INSTRUMENT_OK, REPORT_WITHOUT_RECORD)
        .resolve()
        .unwrap();
    let mut session = InstrumentedSession::new(resolved);

    session.on_start().await.unwrap();
    let err = session.on_exit().await.unwrap_err();

    assert!(matches!(err, HarnessError::ReportVerification { .. }));
    assert!(err.to_string().contains("Unable to generate coverage report"));
}

#[tokio::test]
async fn test_report_tool_failure_propagates() {
    let temp = project();
    let resolved = config(temp.path(), INSTRUMENT_OK, "echo 'no coverage found' >&2; exit 1")
        .resolve()
        .unwrap();
    let mut session = InstrumentedSession::new(resolved);

    session.on_start().await.unwrap();
    let err = session.on_exit().await.unwrap_err();

    match err {
        HarnessError::CommandFailed { code, output, .. } => {
            assert_eq!(code, 1);
            assert!(output.contains("no coverage found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_instrumentation_failure_never_binds_port() {
    let temp = project();
    let port = free_port();
    let resolved = config(temp.path(), "echo 'instrument exploded'; exit 7", REPORT_OK)
        .with_coverage_port(port)
        .resolve()
        .unwrap();
    let mut session = InstrumentedSession::new(resolved);

    let err = session.on_start().await.unwrap_err();

    assert_eq!(err.exit_code(), Some(7));
    assert!(err.to_string().contains("instrument exploded"));
    assert!(!session.is_collecting());
    assert!(std::net::TcpListener::bind(("0.0.0.0", port)).is_ok());
}

#[tokio::test]
async fn test_exit_without_start_has_no_side_effects() {
    let temp = project();
    let resolved = config(temp.path(), INSTRUMENT_OK, REPORT_OK).resolve().unwrap();
    let mut session = InstrumentedSession::new(resolved);

    let err = session.on_exit().await.unwrap_err();

    assert!(matches!(err, HarnessError::NoServer));
    assert!(!temp.path().join("coverage").exists());
}

#[tokio::test]
async fn test_many_clients_each_get_a_fragment() {
    let temp = project();
    let resolved = config(temp.path(), INSTRUMENT_OK, REPORT_OK).resolve().unwrap();
    let mut session = InstrumentedSession::new(resolved);
    let addr = session.on_start().await.unwrap();

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/coverage", addr.port());
    let bodies: Vec<String> = (0..25).map(|i| format!(r#"{{"browser":{i}}}"#)).collect();
    let sends = bodies.iter().map(|body| {
        let request = client.post(&url).body(body.clone());
        async move { request.send().await.unwrap().status().as_u16() }
    });
    let statuses = futures::future::join_all(sends).await;
    assert!(statuses.iter().all(|s| *s == 200));

    let mut stored: Vec<String> = fragments(&temp.path().join("coverage"))
        .iter()
        .map(|f| fs::read_to_string(f).unwrap())
        .collect();
    let mut expected = bodies;
    stored.sort();
    expected.sort();
    assert_eq!(stored, expected);

    session.on_exit().await.unwrap();
}

#[tokio::test]
async fn test_session_can_restart_after_exit() {
    let temp = project();
    let resolved = config(temp.path(), INSTRUMENT_OK, REPORT_OK).resolve().unwrap();
    let mut session = InstrumentedSession::new(resolved);

    session.on_start().await.unwrap();
    session.on_exit().await.unwrap();

    session.on_start().await.unwrap();
    // The second start cleaned the previous report away.
    assert!(!temp.path().join("coverage").join("lcov.info").exists());
    session.on_exit().await.unwrap();
}
