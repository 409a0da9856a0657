//! CSV output schema for station rows

/// Written in place of any value the feed omitted or sent as null
pub const SENTINEL: &str = "undefined";

/// Output columns, in order
pub const CSV_COLUMNS: [&str; 13] = [
    "station_type",
    "name",
    "eightd_has_key_dispenser",
    "has_kiosk",
    "lat",
    "electric_bike_surcharge_waiver",
    "short_name",
    "lon",
    "capacity",
    "externalId",
    "stationId",
    "legacyId",
    "address",
];

/// Verbose feed fields that never reach the CSV
pub const STRIPPED_FIELDS: [&str; 3] = ["rental_methods", "rental_uris", "eightd_station_services"];

/// Header line as emitted on the first block (without terminator)
pub fn csv_header() -> String {
    CSV_COLUMNS.join(",")
}
