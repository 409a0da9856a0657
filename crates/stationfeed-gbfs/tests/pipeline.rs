use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::ObjectStore;
use serde_json::json;
use stationfeed_core::{Artifact, ObjectTarget, SinkTarget};
use stationfeed_gbfs::{Config, Refresher, csv_header};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock feed host; mocks are replaced on every `serve`
struct Feed {
    rt: tokio::runtime::Runtime,
    server: MockServer,
}

impl Feed {
    fn start() -> Self {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        Self { rt, server }
    }

    fn url(&self) -> String {
        format!("{}/gbfs/en/station_information.json", self.server.uri())
    }

    fn serve(&self, body: String, etag: Option<&str>) {
        let mut head = ResponseTemplate::new(200);
        if let Some(etag) = etag {
            head = head.insert_header("ETag", etag);
        }
        self.rt.block_on(async {
            self.server.reset().await;
            Mock::given(method("HEAD"))
                .and(path("/gbfs/en/station_information.json"))
                .respond_with(head)
                .mount(&self.server)
                .await;
            Mock::given(method("GET"))
                .and(path("/gbfs/en/station_information.json"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&self.server)
                .await;
        });
    }

    fn fail_probe(&self) {
        self.rt.block_on(async {
            self.server.reset().await;
            Mock::given(method("HEAD"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&self.server)
                .await;
        });
    }

    fn gets(&self) -> usize {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "GET")
            .count()
    }
}

/// Signer that numbers its URLs, so re-signing is observable
#[derive(Debug, Default)]
struct NumberedSigner {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Signer for NumberedSigner {
    async fn signed_url(
        &self,
        _method: reqwest::Method,
        path: &ObjectPath,
        _expires_in: Duration,
    ) -> object_store::Result<url::Url> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(url::Url::parse(&format!("https://signed.invalid/{path}?sig={n}")).unwrap())
    }
}

fn feed_body(stations: serde_json::Value) -> String {
    json!({
        "last_updated": 1_700_000_000,
        "ttl": 5,
        "data": { "stations": stations },
        "version": "1.1"
    })
    .to_string()
}

fn stations_with_capacity(n: usize, capacity: u32) -> serde_json::Value {
    (0..n)
        .map(|i| {
            json!({
                "station_id": format!("s{i}"),
                "external_id": format!("e{i}"),
                "name": format!("Station {i}"),
                "capacity": capacity,
                "rental_methods": ["KEY"],
            })
        })
        .collect()
}

fn memory_config(feed: &Feed) -> Config {
    Config {
        feed_url: feed.url(),
        sink: SinkTarget::Memory,
        ..Default::default()
    }
}

fn bytes_text(artifact: &Artifact) -> String {
    match artifact {
        Artifact::Bytes(b) => String::from_utf8(b.to_vec()).unwrap(),
        other => panic!("expected bytes, got {other:?}"),
    }
}

#[test]
fn single_small_station_becomes_one_row() {
    let feed = Feed::start();
    feed.serve(
        feed_body(json!([{ "station_id": "1", "external_id": "e1", "capacity": 10 }])),
        Some("\"v1\""),
    );

    let outcome = Refresher::new(memory_config(&feed)).refresh().unwrap();
    assert!(outcome.changed);
    assert_eq!(
        bytes_text(&outcome.artifact),
        format!(
            "{}\nundefined,undefined,undefined,undefined,undefined,undefined,undefined,undefined,10,e1,1,undefined,undefined\n",
            csv_header()
        )
    );
    assert_eq!(outcome.stats.rows_kept, 1);
    assert_eq!(outcome.stats.items_scanned, 1);
}

#[test]
fn large_stations_only_yield_empty_output() {
    let feed = Feed::start();
    feed.serve(
        feed_body(json!([{ "station_id": "a", "capacity": 15 }, { "station_id": "b", "capacity": 20 }])),
        Some("\"v1\""),
    );

    let outcome = Refresher::new(memory_config(&feed)).refresh().unwrap();
    assert_eq!(bytes_text(&outcome.artifact), "");
    assert_eq!(outcome.stats.rows_kept, 0);
    assert_eq!(outcome.stats.blocks, 0);
}

#[test]
fn batches_of_500_to_local_file() {
    let feed = Feed::start();
    feed.serve(feed_body(stations_with_capacity(1_200, 5)), Some("\"v1\""));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("data.csv");

    let config = Config {
        feed_url: feed.url(),
        batch_size: 500,
        sink: SinkTarget::Local { path: out.clone() },
        ..Default::default()
    };
    let outcome = Refresher::new(config).refresh().unwrap();

    assert_eq!(outcome.artifact, Artifact::LocalFile(out.clone()));
    assert_eq!(outcome.stats.blocks, 3);
    assert_eq!(outcome.stats.rows_kept, 1_200);

    let text = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1_201);
    assert_eq!(lines[0], csv_header());
    assert_eq!(lines.iter().filter(|l| **l == csv_header()).count(), 1);
    assert!(lines[1].contains(",s0,"));
    assert!(lines[1_200].contains(",s1199,"));
    assert!(lines[1..].iter().all(|l| l.split(',').count() == 13));
    assert_eq!(outcome.stats.bytes_out, text.len() as u64);
}

#[test]
fn unchanged_validator_skips_download() {
    let feed = Feed::start();
    feed.serve(feed_body(stations_with_capacity(3, 1)), Some("\"v1\""));
    let mut refresher = Refresher::new(memory_config(&feed));

    let first = refresher.refresh().unwrap();
    let second = refresher.refresh().unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(second.artifact, first.artifact);
    assert_eq!(second.indicator.validator.as_deref(), Some("\"v1\""));
    assert_eq!(feed.gets(), 1);
}

#[test]
fn missing_validator_always_refetches() {
    let feed = Feed::start();
    feed.serve(feed_body(stations_with_capacity(3, 1)), None);
    let mut refresher = Refresher::new(memory_config(&feed));

    assert!(refresher.refresh().unwrap().changed);
    assert!(refresher.refresh().unwrap().changed);
    assert_eq!(feed.gets(), 2);
}

#[test]
fn new_validator_refetches() {
    let feed = Feed::start();
    feed.serve(feed_body(stations_with_capacity(2, 1)), Some("\"v1\""));
    let mut refresher = Refresher::new(memory_config(&feed));
    refresher.refresh().unwrap();

    feed.serve(feed_body(stations_with_capacity(5, 1)), Some("\"v2\""));
    let outcome = refresher.refresh().unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.stats.rows_kept, 5);
    assert_eq!(
        refresher.store().indicator().and_then(|i| i.validator.as_deref()),
        Some("\"v2\"")
    );
}

#[test]
fn parse_error_keeps_previous_state_and_file() {
    let feed = Feed::start();
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("data.csv");
    let config = Config {
        feed_url: feed.url(),
        sink: SinkTarget::Local { path: out.clone() },
        ..Default::default()
    };
    let mut refresher = Refresher::new(config);

    feed.serve(feed_body(stations_with_capacity(2, 1)), Some("\"v1\""));
    refresher.refresh().unwrap();
    let before = std::fs::read_to_string(&out).unwrap();

    feed.serve(r#"{"data":{"stations":[{"station_id":"x","capacity":1},"#.to_string(), Some("\"v2\""));
    let err = refresher.refresh().unwrap_err();
    assert_eq!(err.kind(), "parse");

    assert_eq!(
        refresher.store().indicator().and_then(|i| i.validator.as_deref()),
        Some("\"v1\"")
    );
    assert_eq!(std::fs::read_to_string(&out).unwrap(), before);
    assert!(!PathBuf::from(format!("{}.tmp", out.display())).exists());
}

#[test]
fn feed_without_stations_is_parse_error() {
    let feed = Feed::start();
    feed.serve(json!({ "data": { "bikes": [] } }).to_string(), Some("\"v1\""));
    let mut refresher = Refresher::new(memory_config(&feed));

    assert_eq!(refresher.refresh().unwrap_err().kind(), "parse");
    assert!(refresher.store().is_empty());
}

#[test]
fn probe_failure_is_fetch_error() {
    let feed = Feed::start();
    feed.fail_probe();
    let mut refresher = Refresher::new(memory_config(&feed));

    let err = refresher.refresh().unwrap_err();
    assert_eq!(err.kind(), "fetch");
    assert!(refresher.store().is_empty());
}

#[test]
fn deleted_local_artifact_forces_refetch() {
    let feed = Feed::start();
    feed.serve(feed_body(stations_with_capacity(2, 1)), Some("\"v1\""));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("data.csv");
    let config = Config {
        feed_url: feed.url(),
        sink: SinkTarget::Local { path: out.clone() },
        ..Default::default()
    };
    let mut refresher = Refresher::new(config);

    refresher.refresh().unwrap();
    std::fs::remove_file(&out).unwrap();

    let outcome = refresher.refresh().unwrap();
    assert!(outcome.changed);
    assert!(out.exists());
    assert_eq!(feed.gets(), 2);
}

#[test]
fn object_target_uploads_under_key() {
    let feed = Feed::start();
    feed.serve(feed_body(stations_with_capacity(4, 3)), Some("\"v1\""));
    let store = Arc::new(InMemory::new());
    let config = Config {
        feed_url: feed.url(),
        batch_size: 3,
        sink: SinkTarget::Object(ObjectTarget::new(store.clone(), "pge-data-bucket")),
        ..Default::default()
    };

    let outcome = Refresher::new(config).refresh().unwrap();
    assert_eq!(
        outcome.artifact,
        Artifact::Object {
            bucket: "pge-data-bucket".to_string(),
            key: "data.csv".to_string(),
        }
    );

    let uploaded = feed.rt.block_on(async {
        store
            .get(&ObjectPath::from("data.csv"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap()
    });
    let text = String::from_utf8(uploaded.to_vec()).unwrap();
    assert_eq!(text.lines().count(), 5);
    assert!(text.starts_with(&csv_header()));
}

#[test]
fn parallel_filter_matches_sequential() {
    let stations: serde_json::Value = (0..3_000)
        .map(|i| json!({ "station_id": i.to_string(), "capacity": i % 30 }))
        .collect();
    let feed = Feed::start();
    feed.serve(feed_body(stations), None);

    let sequential = Refresher::new(memory_config(&feed)).refresh().unwrap();
    let parallel = Refresher::new(Config {
        workers: 4,
        shard_size: 64,
        ..memory_config(&feed)
    })
    .refresh()
    .unwrap();

    assert_eq!(sequential.artifact, parallel.artifact);
    assert_eq!(parallel.stats.rows_kept, 1_200);
}

#[test]
fn sink_error_keeps_previous_state_and_file() {
    let feed = Feed::start();
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("data.csv");
    let config = Config {
        feed_url: feed.url(),
        sink: SinkTarget::Local { path: out.clone() },
        ..Default::default()
    };
    let mut refresher = Refresher::new(config);

    feed.serve(feed_body(stations_with_capacity(2, 1)), Some("\"v1\""));
    refresher.refresh().unwrap();
    let before = std::fs::read_to_string(&out).unwrap();

    // A directory squatting on the temp path makes the sink fail to open
    std::fs::create_dir(dir.path().join("data.csv.tmp")).unwrap();
    feed.serve(feed_body(stations_with_capacity(5, 1)), Some("\"v2\""));
    let err = refresher.refresh().unwrap_err();
    assert_eq!(err.kind(), "sink");

    assert_eq!(
        refresher.store().indicator().and_then(|i| i.validator.as_deref()),
        Some("\"v1\"")
    );
    assert_eq!(refresher.store().artifact(), Some(&Artifact::LocalFile(out.clone())));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), before);
}

#[test]
fn reused_object_is_signed_again() {
    let feed = Feed::start();
    feed.serve(feed_body(stations_with_capacity(3, 1)), Some("\"v1\""));
    let store = Arc::new(InMemory::new());
    let target = ObjectTarget::new(store, "pge-data-bucket").with_signer(Arc::new(NumberedSigner::default()));
    let config = Config {
        feed_url: feed.url(),
        sink: SinkTarget::Object(target),
        ..Default::default()
    };
    let mut refresher = Refresher::new(config);

    let first = refresher.refresh().unwrap();
    let second = refresher.refresh().unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(
        first.artifact,
        Artifact::SignedUrl("https://signed.invalid/data.csv?sig=1".to_string())
    );
    assert_eq!(
        second.artifact,
        Artifact::SignedUrl("https://signed.invalid/data.csv?sig=2".to_string())
    );
    // The store keeps the stable reference, never a URL that can expire
    assert_eq!(
        refresher.store().artifact(),
        Some(&Artifact::Object {
            bucket: "pge-data-bucket".to_string(),
            key: "data.csv".to_string(),
        })
    );
    assert_eq!(feed.gets(), 1);
}
