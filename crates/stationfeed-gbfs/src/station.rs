//! Station records: the raw feed entry and its CSV projection

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::SENTINEL;

/// One entry of `data.stations` as published by the feed.
///
/// Only the projected keys are kept; everything else (rental methods, URIs,
/// extended-service flags and any future additions) is skipped while parsing.
/// `null` and missing values both end up as `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawStation {
    pub station_id: Option<Value>,
    pub external_id: Option<Value>,
    pub legacy_id: Option<Value>,
    pub capacity: Option<Value>,
    pub station_type: Option<Value>,
    pub name: Option<Value>,
    pub short_name: Option<Value>,
    pub address: Option<Value>,
    pub lat: Option<Value>,
    pub lon: Option<Value>,
    pub eightd_has_key_dispenser: Option<Value>,
    pub has_kiosk: Option<Value>,
    pub electric_bike_surcharge_waiver: Option<Value>,
}

impl RawStation {
    /// Numeric capacity, if present.
    ///
    /// Numeric strings are accepted as numbers; anything else counts as
    /// missing, which excludes the station from the output.
    pub fn capacity(&self) -> Option<f64> {
        match self.capacity.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Station id for log lines
    pub fn label(&self) -> String {
        self.station_id
            .as_ref()
            .map(render_value)
            .unwrap_or_else(|| SENTINEL.to_string())
    }
}

/// A station as written to the CSV, in column order.
///
/// Every column is always present; absent source values hold [`SENTINEL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationRow {
    pub station_type: String,
    pub name: String,
    pub eightd_has_key_dispenser: String,
    pub has_kiosk: String,
    pub lat: String,
    pub electric_bike_surcharge_waiver: String,
    pub short_name: String,
    pub lon: String,
    pub capacity: String,
    #[serde(rename = "externalId")]
    pub external_id: String,
    #[serde(rename = "stationId")]
    pub station_id: String,
    #[serde(rename = "legacyId")]
    pub legacy_id: String,
    pub address: String,
}

impl From<RawStation> for StationRow {
    fn from(raw: RawStation) -> Self {
        Self {
            station_type: render(raw.station_type),
            name: render(raw.name),
            eightd_has_key_dispenser: render(raw.eightd_has_key_dispenser),
            has_kiosk: render(raw.has_kiosk),
            lat: render(raw.lat),
            electric_bike_surcharge_waiver: render(raw.electric_bike_surcharge_waiver),
            short_name: render(raw.short_name),
            lon: render(raw.lon),
            capacity: render(raw.capacity),
            external_id: render(raw.external_id),
            station_id: render(raw.station_id),
            legacy_id: render(raw.legacy_id),
            address: render(raw.address),
        }
    }
}

fn render(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => SENTINEL.to_string(),
        Some(Value::String(s)) => s,
        Some(other) => render_value(&other),
    }
}

/// Text form of a JSON scalar; nested values keep their JSON text
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => SENTINEL.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            // 10.0 prints as 10
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
