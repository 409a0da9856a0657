use serde_json::json;
use stationfeed_gbfs::{FilterRenameStage, RawStation, parse_stations};

fn synthetic_feed(n: usize) -> Vec<u8> {
    let stations: Vec<_> = (0..n)
        .map(|i| {
            json!({
                "station_id": format!("{i:x}"),
                "external_id": format!("ext-{i}"),
                "name": format!("Clark St & Elm St #{i}"),
                "lat": 41.9,
                "lon": -87.6,
                "capacity": i % 40,
                "rental_methods": ["KEY", "CREDITCARD"],
                "rental_uris": { "ios": "x", "android": "y" },
            })
        })
        .collect();
    serde_json::to_vec(&json!({ "data": { "stations": stations } })).unwrap()
}

#[divan::bench]
fn parse_feed(bencher: divan::Bencher) {
    let body = synthetic_feed(5_000);
    bencher.bench(|| parse_stations(&body).unwrap().len());
}

#[divan::bench(args = [1, 4])]
fn filter(bencher: divan::Bencher, workers: usize) {
    let stations: Vec<RawStation> = parse_stations(&synthetic_feed(20_000)).unwrap();
    let stage = FilterRenameStage::default();
    bencher.bench(|| stage.apply_sharded(stations.clone(), workers, 1024).len());
}

fn main() {
    divan::main();
}
