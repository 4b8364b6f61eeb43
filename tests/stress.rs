//! Stress test: many concurrent writers and readers against one node

use http::StatusCode;
use serde_json::{json, Value};
use std::time::Instant;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use weatherhub::common::NodeConfig;
use weatherhub::protocol::{self, header};
use weatherhub::AggregationServer;

const STATIONS: usize = 8;
const WRITES_PER_STATION: usize = 25;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_concurrent_writers() {
    let dir = TempDir::new().unwrap();
    let config = NodeConfig {
        snapshot_path: dir.path().join("data.json"),
        workers: 4,
        ..Default::default()
    };
    let server = AggregationServer::open(config).unwrap();
    let store = server.store();
    let stats = server.stats();
    let clock = server.clock();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = protocol::url(&listener.local_addr().unwrap().to_string());
    let http = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(listener, async {
        rx.await.ok();
    }));

    let start = Instant::now();

    // One writer per station; each waits for its ack before the next write,
    // so later writes always carry a later admission timestamp.
    let mut writers = Vec::new();
    for s in 0..STATIONS {
        let (http, url) = (http.clone(), url.clone());
        writers.push(tokio::spawn(async move {
            let id = format!("IDS{:02}", s);
            let mut lamport = 0;
            let mut replies = Vec::new();
            for seq in 0..WRITES_PER_STATION {
                let response = http
                    .put(&url)
                    .header(header::SERVER_ID, id.as_str())
                    .header(header::LAMPORT_CLOCK, lamport)
                    .json(&json!({"id": id, "seq": seq}))
                    .send()
                    .await
                    .unwrap();
                assert!(response.status().is_success());
                let reply = protocol::lamport(response.headers()).unwrap();
                assert!(reply > lamport);
                lamport = reply;
                replies.push(reply);
            }
            replies
        }));
    }

    // Readers run alongside and only ever see whole documents.
    let mut readers = Vec::new();
    for r in 0..4 {
        let (http, url) = (http.clone(), url.clone());
        readers.push(tokio::spawn(async move {
            for i in 0..20 {
                let id = format!("IDS{:02}", (r + i) % STATIONS);
                let response = http
                    .get(&url)
                    .header(header::CLIENT_ID, "reader")
                    .header(header::LAMPORT_CLOCK, 0u64)
                    .header(header::STATION_ID, id.as_str())
                    .send()
                    .await
                    .unwrap();
                match response.status() {
                    StatusCode::OK => {
                        let doc: Value = response.json().await.unwrap();
                        assert_eq!(doc["id"], id);
                        assert!(doc["seq"].as_u64().unwrap() < WRITES_PER_STATION as u64);
                    }
                    StatusCode::INTERNAL_SERVER_ERROR => {}
                    other => panic!("unexpected status {:?}", other),
                }
            }
        }));
    }

    let mut all_replies = Vec::new();
    for w in writers {
        all_replies.extend(w.await.unwrap());
    }
    for r in readers {
        r.await.unwrap();
    }
    let elapsed = start.elapsed();

    // Every reply timestamp was issued once.
    all_replies.sort_unstable();
    let before = all_replies.len();
    all_replies.dedup();
    assert_eq!(all_replies.len(), before);

    tx.send(()).ok();
    handle.await.unwrap().unwrap();

    let total = (STATIONS * WRITES_PER_STATION) as u64;
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.writes_admitted, total);
    assert_eq!(snapshot.applied, total);
    assert_eq!(snapshot.apply_failures, 0);
    assert!(snapshot.max_admitted < *all_replies.last().unwrap());

    // Last write per station wins.
    assert_eq!(store.len(), STATIONS);
    for s in 0..STATIONS {
        let record = store.get(&format!("IDS{:02}", s)).unwrap();
        assert_eq!(record.payload["seq"], WRITES_PER_STATION - 1);
    }
    assert!(clock.get() >= *all_replies.last().unwrap());

    println!(
        "{} writes + 80 reads in {:?} ({:.0} req/s)",
        total,
        elapsed,
        (total + 80) as f64 / elapsed.as_secs_f64()
    );
}
