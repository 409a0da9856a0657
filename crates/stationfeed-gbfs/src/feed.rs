//! Streaming reader for the `data.stations` array.
//!
//! The body is never materialized: the JSON is walked with a chain of
//! `DeserializeSeed`s and each station is handed to a callback as soon as it
//! is parsed. Every other key, at either level, is skipped.

use std::fmt;
use std::io::{self, Read};

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use stationfeed_core::{PipelineError, StreamError};

use crate::station::RawStation;

/// Walk a feed body, calling `on_station` for every entry of `data.stations`.
///
/// Returns the number of stations read. An error from the callback stops
/// parsing and is returned as-is. A missing `data.stations` array is a
/// parse error; a body reader failure is a fetch error.
pub fn for_each_station<R, F>(reader: R, on_station: F) -> Result<usize, PipelineError>
where
    R: Read,
    F: FnMut(RawStation) -> Result<(), PipelineError>,
{
    let mut handler = Handler {
        on_station,
        aborted: None,
        seen: 0,
    };
    let mut de = serde_json::Deserializer::from_reader(reader);

    let found = match FeedSeed(&mut handler).deserialize(&mut de).and_then(|found| {
        de.end()?;
        Ok(found)
    }) {
        Ok(found) => found,
        Err(e) => return Err(handler.aborted.take().unwrap_or_else(|| classify(e))),
    };

    if !found {
        return Err(PipelineError::Parse(
            "feed has no data.stations array".to_string(),
        ));
    }
    log::debug!("Parsed {} stations", handler.seen);
    Ok(handler.seen)
}

/// Parse a whole in-memory feed into stations
pub fn parse_stations(body: &[u8]) -> Result<Vec<RawStation>, PipelineError> {
    let mut stations = Vec::new();
    for_each_station(body, |s| {
        stations.push(s);
        Ok(())
    })?;
    Ok(stations)
}

/// Body read failures surface through serde_json as I/O errors
fn classify(e: serde_json::Error) -> PipelineError {
    if e.is_io() {
        PipelineError::Fetch(StreamError::Io(io::Error::from(e)))
    } else {
        PipelineError::Parse(e.to_string())
    }
}

struct Handler<F> {
    on_station: F,
    aborted: Option<PipelineError>,
    seen: usize,
}

/// Top-level object; yields whether `data.stations` was seen
struct FeedSeed<'a, F>(&'a mut Handler<F>);

impl<'de, F> DeserializeSeed<'de> for FeedSeed<'_, F>
where
    F: FnMut(RawStation) -> Result<(), PipelineError>,
{
    type Value = bool;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F> Visitor<'de> for FeedSeed<'_, F>
where
    F: FnMut(RawStation) -> Result<(), PipelineError>,
{
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a feed object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<bool, A::Error> {
        let mut found = false;
        while let Some(key) = map.next_key::<String>()? {
            if key == "data" {
                found |= map.next_value_seed(DataSeed(&mut *self.0))?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

/// The `data` object; yields whether `stations` was seen
struct DataSeed<'a, F>(&'a mut Handler<F>);

impl<'de, F> DeserializeSeed<'de> for DataSeed<'_, F>
where
    F: FnMut(RawStation) -> Result<(), PipelineError>,
{
    type Value = bool;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F> Visitor<'de> for DataSeed<'_, F>
where
    F: FnMut(RawStation) -> Result<(), PipelineError>,
{
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a data object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<bool, A::Error> {
        let mut found = false;
        while let Some(key) = map.next_key::<String>()? {
            if key == "stations" {
                map.next_value_seed(StationsSeed(&mut *self.0))?;
                found = true;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

/// The `stations` array, delivered element by element
struct StationsSeed<'a, F>(&'a mut Handler<F>);

impl<'de, F> DeserializeSeed<'de> for StationsSeed<'_, F>
where
    F: FnMut(RawStation) -> Result<(), PipelineError>,
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, F> Visitor<'de> for StationsSeed<'_, F>
where
    F: FnMut(RawStation) -> Result<(), PipelineError>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of stations")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let handler = self.0;
        while let Some(station) = seq.next_element::<RawStation>()? {
            handler.seen += 1;
            if let Err(e) = (handler.on_station)(station) {
                handler.aborted = Some(e);
                return Err(de::Error::custom("station handler stopped the feed"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stationfeed_core::SinkError;

    fn ids(body: &str) -> Result<Vec<String>, PipelineError> {
        Ok(parse_stations(body.as_bytes())?
            .into_iter()
            .map(|s| s.label())
            .collect())
    }

    #[test]
    fn reads_stations_in_order() {
        let body = r#"{"last_updated":1,"ttl":5,"data":{"stations":[
            {"station_id":"a","capacity":3},
            {"station_id":"b","capacity":30},
            {"station_id":"c"}
        ]},"version":"1.1"}"#;
        assert_eq!(ids(body).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn siblings_of_stations_are_ignored() {
        let body = r#"{"data":{"meta":{"nested":[1,2,{"x":null}]},"stations":[{"station_id":"z"}],"extra":true}}"#;
        assert_eq!(ids(body).unwrap(), vec!["z"]);
    }

    #[test]
    fn empty_array_is_ok() {
        assert_eq!(ids(r#"{"data":{"stations":[]}}"#).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn missing_array_is_parse_error() {
        for body in [r#"{"data":{}}"#, r#"{"other":1}"#, r#"{}"#] {
            let err = ids(body).unwrap_err();
            assert_eq!(err.kind(), "parse", "{body}");
        }
    }

    #[test]
    fn malformed_json_is_parse_error() {
        for body in [
            "not json",
            r#"{"data":{"stations":[{"station_id":"a"}"#,
            r#"{"data":{"stations":{"a":1}}}"#,
            r#"[]"#,
            r#"{"data":{"stations":[]}} trailing"#,
        ] {
            assert_eq!(ids(body).unwrap_err().kind(), "parse", "{body}");
        }
    }

    #[test]
    fn callback_error_stops_parsing() {
        let body = r#"{"data":{"stations":[{"station_id":"a"},{"station_id":"b"},{"station_id":"c"}]}}"#;
        let mut seen = 0;
        let err = for_each_station(body.as_bytes(), |_| {
            seen += 1;
            if seen == 2 {
                return Err(PipelineError::Sink(SinkError::Closed("disk full".into())));
            }
            Ok(())
        })
        .unwrap_err();
        assert_eq!(seen, 2);
        assert_eq!(err.kind(), "sink");
    }

    #[test]
    fn reader_failure_is_fetch_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
            }
        }
        let err = for_each_station(Broken, |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), "fetch");
    }
}
