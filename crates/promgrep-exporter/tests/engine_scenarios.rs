//! End-to-end: input stream -> workers -> HTTP exposition.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use promgrep_core::PromgrepError;
use promgrep_exporter::config::{self, PromgrepConfig};
use promgrep_exporter::dispatch::{LineObserver, NoopObserver};
use promgrep_exporter::engine::{Engine, EngineHandle};

fn config_with(rules: &str, engine: &str) -> PromgrepConfig {
    let yaml = format!(
        "version: 1\nexporter: {{ host: 127.0.0.1, port: 0 }}\n{engine}\nrules:\n{rules}"
    );
    config::load_from_str(&yaml).unwrap()
}

fn noop() -> Arc<dyn LineObserver> {
    Arc::new(NoopObserver)
}

async fn run_to_end(cfg: &PromgrepConfig, input: &str) -> EngineHandle {
    let reader = Cursor::new(input.as_bytes().to_vec());
    let mut engine = Engine::start(cfg, reader, noop(), CancellationToken::new())
        .await
        .unwrap();
    engine.wait_stream().await.unwrap();
    engine
}

async fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut s = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    s.write_all(req.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    s.read_to_end(&mut buf).await.unwrap();
    let text = String::from_utf8(buf).unwrap();
    let status = text[9..12].parse().unwrap();
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn basic_patterns() {
    let cfg = config_with(
        r#"
  - { name: all, pattern: ".*", kind: summary }
  - { name: empty, pattern: "", kind: summary }
  - { name: full, pattern: "123abc", kind: summary }
"#,
        "",
    );
    let engine = run_to_end(&cfg, "abc123abc123\n").await;

    let (status, body) = get(engine.local_addr(), "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("promgrep_all_sum 0\n"), "{body}");
    assert!(body.contains("promgrep_all_count 1\n"), "{body}");
    assert!(body.contains("promgrep_empty_sum 0\n"));
    assert!(body.contains("promgrep_empty_count 1\n"));
    assert!(body.contains("promgrep_full_sum 0\n"));
    assert!(body.contains("promgrep_full_count 1\n"));
    assert!(body.contains("promgrep_stream_lines_total 1\n"));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn occurrence_counts_across_lines() {
    let cfg = config_with(
        r#"
  - { name: full2, pattern: "sfasfads123abcasdfadfsa1", kind: summary }
  - { name: xyz, pattern: "ABC.*XYZ", kind: summary }
  - { name: 123abc, pattern: "123abc", kind: summary }
  - { name: numbers, pattern: "[0-9]{3,3}", kind: summary }
  - { name: numbers_summed, pattern: "([0-9]{3,3})", kind: summary }
"#,
        "engine: { queue_capacity: 1 }",
    );
    let input = "abc123abc123ABCasfasfads123abcasdfadfsa123abcsdfasdfas123abcXYZaskdfjakljdhf\n\
                 aslkdfj asldkjfh lksjdhf alkjdf lkasdfhABCalsdfjha678sldkjf432hsadlk098fXYY ajkldhfjlashdfljkadshABC lshfalksjfhaklsdhf XYZ";
    let engine = run_to_end(&cfg, input).await;

    let body = engine.registry().render();
    assert!(body.contains("promgrep_full2_count 1\n"));
    assert!(body.contains("promgrep_xyz_count 2\n"));
    assert!(body.contains("promgrep_123abc_count 4\n"));
    assert!(body.contains("promgrep_123abc_sum 0\n"));
    assert!(body.contains("promgrep_numbers_count 8\n"));
    assert!(body.contains("promgrep_numbers_sum 0\n"));
    assert!(body.contains("promgrep_numbers_summed_count 8\n"));
    assert!(body.contains("promgrep_numbers_summed_sum 1823\n"));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn value_extraction_per_kind() {
    let cfg = config_with(
        r#"
  - { name: num3, pattern: "abc([0-9]+)", kind: summary }
  - { name: test30001, pattern: "TEST=([0-9]+)", kind: summary }
  - { name: float98, pattern: 'TEST=([0-9\.]+)', kind: gauge }
  - { name: tests_total, pattern: "TEST=", kind: counter }
  - { name: test_amount, pattern: "TEST=([0-9]+)", kind: counter }
"#,
        "",
    );
    let input = "abc123abc123ABCasfasfads123abcasdTEST=10000fadfsa123abcsdfasdfas123abcXYZaskdfjakTEST=20000ljdhf\n\
                 aslkdfj asldkjfh lksjdhf alkjdf lkasdfTEST=1.123hABCalsdfjha=678sldkjf432hsadlk098fXYY ajkldhfjlashdfljkadshABC lshfalksjfhaklsdhf XYZ";
    let engine = run_to_end(&cfg, input).await;

    let (_, body) = get(engine.local_addr(), "/metrics").await;
    assert!(body.contains("promgrep_num3_count 2\n"));
    assert!(body.contains("promgrep_num3_sum 246\n"));
    assert!(body.contains("promgrep_test30001_count 3\n"));
    assert!(body.contains("promgrep_test30001_sum 30001\n"));
    assert!(body.contains("# TYPE promgrep_float98 gauge\n"));
    assert!(body.contains("promgrep_float98 1.123\n"));
    assert!(body.contains("promgrep_tests_total 3\n"));
    assert!(body.contains("promgrep_test_amount 30001\n"));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn labels_partition_summary_and_gauge() {
    let cfg = config_with(
        r#"
  - { name: magic, pattern: "abc([0-9]+).*XYZ=([a-zA-Z]+)", kind: summary }
  - { name: temp, pattern: 'room=(\w+) t=([0-9.]+)', kind: gauge }
"#,
        "",
    );
    let input = "abc123 noise XYZ=ABRACADABRA\n\
                 room=kitchen t=20.5\n\
                 room=hall t=18\n\
                 room=kitchen t=21.25\n";
    let engine = run_to_end(&cfg, input).await;

    let body = engine.registry().render();
    assert!(body.contains("promgrep_magic_sum{label=\"ABRACADABRA\"} 123\n"), "{body}");
    assert!(body.contains("promgrep_magic_count{label=\"ABRACADABRA\"} 1\n"));
    assert!(body.contains("promgrep_temp{label=\"kitchen\"} 21.25\n"));
    assert!(body.contains("promgrep_temp{label=\"hall\"} 18\n"));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn health_endpoints_follow_stream_state() {
    let cfg = config_with("  - { name: x, pattern: x, kind: counter }\n", "");
    let (mut tx, rx) = tokio::io::duplex(64);
    let mut engine = Engine::start(&cfg, rx, noop(), CancellationToken::new())
        .await
        .unwrap();

    tx.write_all(b"xx\n").await.unwrap();
    let registry = engine.registry();
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.lines_total() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let addr = engine.local_addr();
    assert_eq!(get(addr, "/healthz").await, (200, "ok".to_string()));
    assert_eq!(get(addr, "/readyz").await, (200, "streaming".to_string()));

    drop(tx);
    assert_eq!(engine.wait_stream().await.unwrap(), 1);
    assert_eq!(get(addr, "/readyz").await.0, 503);
    assert!(registry.render().contains("promgrep_x 2\n"));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancellation_stops_open_stream_and_listener() {
    let cfg = config_with("  - { name: x, pattern: x, kind: counter }\n", "");
    // writer stays open: the stream never ends by itself
    let (_tx, rx) = tokio::io::duplex(64);
    let cancel = CancellationToken::new();
    let engine = Engine::start(&cfg, rx, noop(), cancel.clone()).await.unwrap();
    let addr = engine.local_addr();
    let registry = engine.registry();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), engine.shutdown())
        .await
        .unwrap()
        .unwrap();

    assert!(!registry.is_stream_open());
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn configuration_errors_fail_start() {
    let cfg = config::load_from_str("version: 1\nexporter: { host: 127.0.0.1, port: 0 }").unwrap();
    let err = Engine::start(&cfg, Cursor::new(Vec::new()), noop(), CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PromgrepError::NoRules));

    let cfg = config_with("  - { name: g, pattern: 'no-group', kind: gauge }\n", "");
    let err = Engine::start(&cfg, Cursor::new(Vec::new()), noop(), CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PromgrepError::GaugeWithoutCapture(_)));

    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let yaml = format!(
        "version: 1\nexporter: {{ host: 127.0.0.1, port: {port} }}\nrules:\n  - {{ name: x, pattern: x, kind: counter }}\n"
    );
    let cfg = config::load_from_str(&yaml).unwrap();
    let err = Engine::start(&cfg, Cursor::new(Vec::new()), noop(), CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PromgrepError::Bind { .. }));
    assert_eq!(err.category().as_str(), "CONFIG");
}

#[tokio::test]
async fn read_error_ends_stream_without_crash() {
    let cfg = config_with(
        "  - { name: x, pattern: x, kind: counter }\n",
        "engine: { max_line_bytes: 1024 }",
    );
    let mut input = "x\n".to_string();
    input.push_str(&"y".repeat(4096));
    input.push_str("\nx\n");
    let reader = Cursor::new(input.into_bytes());
    let mut engine = Engine::start(&cfg, reader, noop(), CancellationToken::new())
        .await
        .unwrap();

    let err = engine.wait_stream().await.expect_err("overlong line must end the stream");
    assert!(matches!(err, PromgrepError::LineTooLong(1024)));
    assert!(engine.registry().render().contains("promgrep_x 1\n"));

    engine.shutdown().await.unwrap();
}
