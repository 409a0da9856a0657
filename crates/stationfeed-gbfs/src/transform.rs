//! Capacity filter and rename projection

use stationfeed_core::{into_shards, map_shards_ordered};

use crate::station::{RawStation, StationRow};

/// Default threshold: stations with capacity below this are kept
pub const DEFAULT_MAX_CAPACITY: u32 = 12;

/// Keeps stations with `capacity < max_capacity` and projects them to rows.
///
/// A station without a numeric capacity is dropped, never an error.
#[derive(Debug, Clone, Copy)]
pub struct FilterRenameStage {
    max_capacity: f64,
}

impl Default for FilterRenameStage {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY)
    }
}

impl FilterRenameStage {
    pub fn new(max_capacity: u32) -> Self {
        Self {
            max_capacity: f64::from(max_capacity),
        }
    }

    pub fn accepts(&self, station: &RawStation) -> bool {
        station
            .capacity()
            .is_some_and(|capacity| capacity < self.max_capacity)
    }

    /// Filter and project one station
    pub fn apply(&self, station: RawStation) -> Option<StationRow> {
        if !self.accepts(&station) {
            log::trace!("Dropping station {}", station.label());
            return None;
        }
        Some(StationRow::from(station))
    }

    /// Lazily filter a single-pass station sequence, preserving order
    pub fn rows<I>(self, stations: I) -> impl Iterator<Item = StationRow>
    where
        I: IntoIterator<Item = RawStation>,
    {
        stations.into_iter().filter_map(move |s| self.apply(s))
    }

    /// Filter a window of stations on `workers` threads.
    ///
    /// The window is cut into shards of `shard_size`; results are merged by
    /// shard index, so the output is identical to [`rows`](Self::rows).
    pub fn apply_sharded(
        &self,
        stations: Vec<RawStation>,
        workers: usize,
        shard_size: usize,
    ) -> Vec<StationRow> {
        let stage = *self;
        map_shards_ordered(into_shards(stations, shard_size), workers, |shard| {
            shard
                .iter()
                .filter(|s| stage.accepts(s))
                .cloned()
                .map(StationRow::from)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn station(id: usize, capacity: Option<u32>) -> RawStation {
        RawStation {
            station_id: Some(json!(id.to_string())),
            capacity: capacity.map(|c| json!(c)),
            ..Default::default()
        }
    }

    #[test]
    fn threshold_is_exclusive() {
        let stage = FilterRenameStage::default();
        assert!(stage.accepts(&station(1, Some(11))));
        assert!(!stage.accepts(&station(2, Some(12))));
        assert!(!stage.accepts(&station(3, Some(40))));
        assert!(stage.accepts(&station(4, Some(0))));
    }

    #[test]
    fn missing_capacity_is_excluded() {
        let stage = FilterRenameStage::default();
        assert!(stage.apply(station(1, None)).is_none());
    }

    #[test]
    fn configurable_threshold() {
        let stage = FilterRenameStage::new(30);
        assert!(stage.accepts(&station(1, Some(29))));
        assert!(!stage.accepts(&station(1, Some(30))));
    }

    #[test]
    fn rows_preserve_source_order() {
        let stations = vec![
            station(1, Some(5)),
            station(2, Some(50)),
            station(3, Some(7)),
            station(4, None),
            station(5, Some(11)),
        ];
        let ids: Vec<String> = FilterRenameStage::default()
            .rows(stations)
            .map(|r| r.station_id)
            .collect();
        assert_eq!(ids, vec!["1", "3", "5"]);
    }

    #[test]
    fn empty_input_empty_output() {
        assert_eq!(FilterRenameStage::default().rows(Vec::new()).count(), 0);
    }

    #[test]
    fn sharded_matches_sequential() {
        let stations: Vec<RawStation> = (0..5_000)
            .map(|i| station(i, Some((i % 25) as u32)))
            .collect();
        let stage = FilterRenameStage::default();

        let sequential: Vec<StationRow> = stage.rows(stations.clone()).collect();
        let sharded = stage.apply_sharded(stations, 4, 97);
        assert_eq!(sequential, sharded);
        assert_eq!(sharded.len(), 5_000 / 25 * 12);
    }
}
