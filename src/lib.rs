// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::arc_with_non_send_sync,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::bytes_nth,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

#[macro_use]
extern crate serde;

pub mod budget_governor;
pub mod errors;
pub mod feed_ingestion;
pub mod geometry_utils;
pub mod models;
pub mod penalty_engine;
pub mod postgis_to_diesel;
pub mod postgres_tools;
pub mod route_calculator;
pub mod routing_config;
pub mod routing_engines;
pub mod schema;
pub mod settings;
pub mod traffic_events;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

pub const WGS_84_SRID: u32 = 4326;

/// A WGS84 position as dispatch hands it to us.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coordinate { lat, lon }
    }

    pub fn to_coord(self) -> geo::Coord {
        geo::Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

impl From<geo::Coord> for Coordinate {
    fn from(coord: geo::Coord) -> Self {
        Coordinate {
            lat: coord.y,
            lon: coord.x,
        }
    }
}

/// First day of the month `time` falls in, used to tag the spend counter.
pub fn billing_month(time: DateTime<Utc>) -> NaiveDate {
    time.date_naive().with_day(1).unwrap_or_else(|| time.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn billing_month_is_first_of_month() {
        let t = Utc.with_ymd_and_hms(2026, 10, 18, 23, 59, 0).unwrap();
        assert_eq!(billing_month(t), NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
    }

    #[test]
    fn coordinate_maps_to_lon_lat_coord() {
        let c = Coordinate::new(42.0, -87.9).to_coord();
        assert_eq!(c.x, -87.9);
        assert_eq!(c.y, 42.0);
    }
}
