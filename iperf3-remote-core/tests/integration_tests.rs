// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end integration tests for iperf3-remote.
//!
//! Most tests drive a fake `iperf3` shell script written into a temp
//! directory, so they run without iperf3 installed. The real-iperf3 test is
//! ignored by default.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use iperf3_remote_core::server::ServerProcess;
use iperf3_remote_core::{
    ArgValue, ClientOptions, CommandLine, ConfigLoader, Iperf3Library, KeywordError, Port,
    RemoteValue, Runner, ServerOptions,
};
use tempfile::TempDir;

const REPORT: &str = r#"{
  "start": {
    "connecting_to": { "host": "127.0.0.1", "port": 5201 },
    "test_start": { "protocol": "TCP", "num_streams": 1, "duration": 1 }
  },
  "intervals": [
    { "sum": { "bytes": 11527782400, "bits_per_second": 92214509257.57492, "omitted": false } }
  ],
  "end": {
    "sum_sent": { "bytes": 11527782400, "bits_per_second": 92214513180.8928, "retransmits": 0 },
    "sum_received": { "bytes": 11527782400, "bits_per_second": 92213959943.60509 }
  }
}"#;

/// Write an executable shell script and return its path.
fn fake_iperf3(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");

    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();

    path
}

fn runner_for(path: &Path, margin: Duration) -> Runner {
    Runner::new(path.to_str().unwrap(), margin)
}

/// Successful run: arguments reach the binary and large counters are widened.
#[tokio::test]
async fn test_client_report_is_widened() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let args_file = temp_dir.path().join("args.txt");
    let script = fake_iperf3(
        temp_dir.path(),
        "iperf3",
        &format!(
            "echo \"$@\" > '{}'\ncat <<'EOF'\n{}\nEOF",
            args_file.display(),
            REPORT
        ),
    );

    let library = Iperf3Library::new(runner_for(&script, Duration::from_secs(10)));
    let result = library
        .run_keyword(
            "Run Client",
            vec!["127.0.0.1".into()],
            vec![
                ("duration".to_string(), ArgValue::Int(1)),
                ("bidir".to_string(), "True".into()),
            ],
        )
        .await
        .expect("Run Client failed");

    let args = std::fs::read_to_string(&args_file).expect("Failed to read args");
    assert_eq!(args.trim(), "-J -c 127.0.0.1 --time 1 --bidir");

    let end = result.get("end").expect("end section");
    let sent = end.get("sum_sent").unwrap();
    assert_eq!(sent.get("bytes"), Some(&RemoteValue::Double(11527782400.0)));
    assert_eq!(sent.get("retransmits"), Some(&RemoteValue::Int(0)));

    let received = end.get("sum_received").unwrap();
    assert!(received.get("bits_per_second").unwrap().as_f64().unwrap() >= 0.0);
    assert!(received.get("bytes").unwrap().as_f64().unwrap() >= 0.0);

    let port = result
        .get("start")
        .and_then(|s| s.get("connecting_to"))
        .and_then(|c| c.get("port"));
    assert_eq!(port, Some(&RemoteValue::Int(5201)));
}

/// Non-zero exit with iperf3's JSON error object.
#[tokio::test]
async fn test_execution_error_uses_json_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let script = fake_iperf3(
        temp_dir.path(),
        "iperf3",
        r#"echo '{"start": {}, "error": "unable to connect to server: Connection refused"}'
echo 'ignored stderr' >&2
exit 1"#,
    );

    let runner = runner_for(&script, Duration::from_secs(10));
    let err = runner
        .run_client(&ClientOptions::new("127.0.0.1"))
        .await
        .unwrap_err();

    match err {
        KeywordError::Execution { reason } => {
            assert_eq!(reason, "unable to connect to server: Connection refused")
        }
        other => panic!("expected Execution, got {other:?}"),
    }
}

/// Non-zero exit without JSON falls back to stderr.
#[tokio::test]
async fn test_execution_error_uses_stderr() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let script = fake_iperf3(
        temp_dir.path(),
        "iperf3",
        "echo 'iperf3: parameter error - some option you are trying to set is client only' >&2\nexit 1",
    );

    let runner = runner_for(&script, Duration::from_secs(10));
    let err = runner
        .run_client(&ClientOptions::new("127.0.0.1"))
        .await
        .unwrap_err();

    match err {
        KeywordError::Execution { reason } => assert!(reason.contains("parameter error")),
        other => panic!("expected Execution, got {other:?}"),
    }
}

/// Exit 0 but not JSON.
#[tokio::test]
async fn test_unparseable_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let script = fake_iperf3(
        temp_dir.path(),
        "iperf3",
        "echo 'Connecting to host 127.0.0.1, port 5201'",
    );

    let runner = runner_for(&script, Duration::from_secs(10));
    let err = runner
        .run_client(&ClientOptions::new("127.0.0.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, KeywordError::Parse { .. }));
}

/// A hung process is killed once duration + margin has passed.
#[tokio::test]
async fn test_hung_client_times_out() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let script = fake_iperf3(temp_dir.path(), "iperf3", "exec sleep 30");

    let runner = runner_for(&script, Duration::from_millis(500));
    let mut options = ClientOptions::new("127.0.0.1");
    options.duration = Some(1);

    let start = Instant::now();
    let err = runner.run_client(&options).await.unwrap_err();
    let elapsed = start.elapsed();

    match err {
        KeywordError::Timeout { after } => assert_eq!(after, Duration::from_millis(1500)),
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(1500));
    assert!(elapsed < Duration::from_secs(10), "process was not killed");
}

/// Direct run with an explicit bound.
#[tokio::test]
async fn test_run_with_explicit_timeout() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let script = fake_iperf3(temp_dir.path(), "iperf3", "exec sleep 30");

    let runner = runner_for(&script, Duration::ZERO);
    let cmd = CommandLine {
        program: script.to_str().unwrap().to_string(),
        args: vec!["-J".to_string()],
    };
    let err = runner
        .run(&cmd, Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, KeywordError::Timeout { .. }));
}

/// A binary that is not executable counts as missing.
#[tokio::test]
async fn test_non_executable_binary() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("iperf3");
    std::fs::write(&path, "not a program").expect("Failed to write file");

    let runner = runner_for(&path, Duration::from_secs(10));
    let err = runner
        .run_client(&ClientOptions::new("127.0.0.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, KeywordError::BinaryNotFound { .. }));
}

/// Missing binary through the keyword interface.
#[tokio::test]
async fn test_missing_binary_keyword() {
    let library = Iperf3Library::new(Runner::new(
        "iperf3-definitely-not-installed",
        Duration::from_secs(10),
    ));
    let err = library
        .run_keyword("run_client", vec!["127.0.0.1".into()], vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, KeywordError::BinaryNotFound { .. }));
}

/// Server lifecycle: one process per library, reports returned on stop.
#[tokio::test]
async fn test_server_start_stop_collects_reports() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let starts = temp_dir.path().join("starts.txt");
    let script = fake_iperf3(
        temp_dir.path(),
        "iperf3",
        &format!(
            "echo \"$@\" >> '{}'\nprintf '{{\\n\"start\": {{}}\\n}}\\n{{\\n\"end\": {{\"bytes\": 5000000000}}\\n}}\\n'\nexec sleep 30",
            starts.display()
        ),
    );

    let library = Iperf3Library::new(runner_for(&script, Duration::from_secs(10)));
    library
        .run_keyword("Start Server", vec!["11211".into()], vec![])
        .await
        .expect("Start Server failed");
    library
        .run_keyword("Start Server", vec![], vec![])
        .await
        .expect("second Start Server failed");

    // Let the fake server print its reports.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let result = library
        .run_keyword("Stop Server", vec![], vec![])
        .await
        .expect("Stop Server failed");

    let starts = std::fs::read_to_string(&starts).expect("Failed to read starts");
    assert_eq!(starts.lines().collect::<Vec<_>>(), vec!["-s -J -p 11211"]);

    let RemoteValue::Array(reports) = result else {
        panic!("Stop Server should return a list");
    };
    assert_eq!(reports.len(), 2);
    assert!(reports[0].get("start").is_some());
    assert_eq!(
        reports[1].get("end").and_then(|e| e.get("bytes")),
        Some(&RemoteValue::Double(5e9))
    );

    // Stopped servers are forgotten.
    assert!(library.stop_server().await.is_empty());
}

/// A server process remembers how it was started until stopped.
#[tokio::test]
async fn test_server_process_handle() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let script = fake_iperf3(temp_dir.path(), "iperf3", "exec sleep 30");

    let options = ServerOptions {
        port: Some(Port::new(5202).unwrap()),
        bind_address: Some("127.0.0.1".to_string()),
    };
    let mut process =
        ServerProcess::spawn(script.to_str().unwrap(), &options).expect("spawn failed");

    assert!(process.pid().is_some());
    assert!(process.is_running());
    assert_eq!(process.options().port, options.port);
    assert_eq!(process.options().bind_address.as_deref(), Some("127.0.0.1"));

    let reports = process.stop().await.expect("stop failed");
    assert!(reports.is_empty());
}

/// Garbage server output is logged and yields an empty list.
#[tokio::test]
async fn test_server_garbage_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let script = fake_iperf3(
        temp_dir.path(),
        "iperf3",
        "echo 'iperf3: error - unable to start listener'\nexec sleep 30",
    );

    let library = Iperf3Library::new(runner_for(&script, Duration::from_secs(10)));
    library
        .start_server(&Default::default())
        .await
        .expect("start failed");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(library.stop_server().await.is_empty());
}

/// Test configuration loading from disk
#[test]
fn test_config_loading_and_validation() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("iperf3-remote.yaml");

    std::fs::write(
        &config_path,
        r#"
remote:
  address: 127.0.0.1
  port: 18270

iperf3:
  binary: iperf3
  timeout_margin_secs: 3
"#,
    )
    .expect("Failed to write config");

    let config = ConfigLoader::load_file(&config_path).expect("Failed to load config");
    assert_eq!(config.remote.port.value(), 18270);
    assert_eq!(config.iperf3.timeout_margin, Duration::from_secs(3));
}

/// Real iperf3 client against a real iperf3 server on localhost.
#[tokio::test]
#[ignore = "requires iperf3 in PATH"]
async fn test_e2e_real_iperf3() {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let library = Iperf3Library::default();
    library
        .run_keyword(
            "Start Server",
            vec![ArgValue::Int(port.into()), "127.0.0.1".into()],
            vec![],
        )
        .await
        .expect("Start Server failed");
    tokio::time::sleep(Duration::from_millis(500)).await;

    let result = library
        .run_keyword(
            "Run Client",
            vec!["127.0.0.1".into(), ArgValue::Int(port.into())],
            vec![("duration".to_string(), ArgValue::Int(1))],
        )
        .await
        .expect("Run Client failed");

    let received = result
        .get("end")
        .and_then(|e| e.get("sum_received"))
        .expect("sum_received");
    assert!(received.get("bits_per_second").unwrap().as_f64().unwrap() >= 0.0);
    assert!(received.get("bytes").unwrap().as_f64().unwrap() >= 0.0);

    let reports = library.stop_server().await;
    assert_eq!(reports.len(), 1);
}
