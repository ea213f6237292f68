//! Geodistance for `$near`.
//!
//! Locations are always `[longitude, latitude]` pairs or `{lon, lat}`
//! records. Distances are strings such as `"15mi"` or `"10km"`, or bare
//! numbers.
//!
//! **A bare number is not miles.** It is a multiple of the Earth's radius
//! (an angle in radians): `$maxDistance: 0.01` is roughly 40 miles. Prefer
//! the string form with an explicit unit.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QueryError, Result};
use crate::value::Value;

/// Earth radius used for distance computation.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Earth radius used when emitting a bare-number `$maxDistance`.
pub const EMITTED_EARTH_RADIUS_MILES: f64 = 3959.0;

/// Miles in one kilometer.
pub const MILES_PER_KILOMETER: f64 = 0.621371;

static DISTANCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([\d.]+)\s*(mi|miles?|km|kilometers?)?$").expect("distance pattern is valid")
});

/// A point on the globe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl Location {
    /// Creates a location from longitude and latitude.
    pub fn new(lon: f64, lat: f64) -> Self {
        Location { lon, lat }
    }

    /// Reads `[lon, lat]` or `{lon, lat}`.
    pub fn from_value(value: &Value) -> Option<Location> {
        match value {
            Value::List(items) => match items.as_slice() {
                [Value::Number(lon), Value::Number(lat)] => Some(Location::new(lon.to_f64(), lat.to_f64())),
                _ => None,
            },
            Value::Record(map) => {
                let lon = map.get("lon").and_then(Value::as_number)?;
                let lat = map.get("lat").and_then(Value::as_number)?;
                Some(Location::new(lon.to_f64(), lat.to_f64()))
            }
            _ => None,
        }
    }

    /// Returns `true` if `value` is a `[lon, lat]` pair of numbers.
    pub fn is_pair(value: &Value) -> bool {
        matches!(value.as_list(), Some([Value::Number(_), Value::Number(_)]))
    }
}

/// How `$near` measures distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceType {
    /// Great-circle distance (haversine).
    #[default]
    Arc,
    /// Equirectangular approximation; only suitable for short distances.
    Plane,
}

impl DistanceType {
    /// Parses `"arc"` or `"plane"`.
    pub fn parse(s: &str) -> Option<DistanceType> {
        match s {
            "arc" => Some(DistanceType::Arc),
            "plane" => Some(DistanceType::Plane),
            _ => None,
        }
    }

    /// Returns the option value.
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceType::Arc => "arc",
            DistanceType::Plane => "plane",
        }
    }
}

/// A validated `$maxDistance`.
#[derive(Debug, Clone, PartialEq)]
pub enum Distance {
    /// Bare number: multiples of the Earth's radius.
    Radians(f64),
    /// `<number><unit?>` string, kept verbatim for emission.
    Text {
        /// The string as written in the query.
        raw: String,
        /// The distance converted to miles.
        miles: f64,
    },
}

impl Distance {
    /// Validates a `$maxDistance` operand.
    pub fn parse(value: &Value) -> Result<Distance> {
        match value {
            Value::Number(n) => Ok(Distance::Radians(n.to_f64())),
            Value::Text(raw) => {
                let invalid = || QueryError::InvalidDistance(raw.clone());
                let caps = DISTANCE.captures(raw.trim()).ok_or_else(invalid)?;
                let magnitude: f64 = caps[1].parse().map_err(|_| invalid())?;
                let in_miles = caps
                    .get(2)
                    .map_or(true, |unit| unit.as_str().to_ascii_lowercase().starts_with("mi"));
                let miles = if in_miles {
                    magnitude
                } else {
                    magnitude * MILES_PER_KILOMETER
                };
                Ok(Distance::Text {
                    raw: raw.clone(),
                    miles,
                })
            }
            other => Err(QueryError::InvalidDistance(other.to_text().unwrap_or_else(|| {
                other.type_name().to_string()
            }))),
        }
    }

    /// The distance in miles.
    pub fn miles(&self) -> f64 {
        match self {
            Distance::Radians(r) => r * EARTH_RADIUS_MILES,
            Distance::Text { miles, .. } => *miles,
        }
    }

    /// The `distance` value of an emitted `geo_distance` fragment.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Distance::Radians(r) => serde_json::Value::String(format!("{}mi", r * EMITTED_EARTH_RADIUS_MILES)),
            Distance::Text { raw, .. } => serde_json::Value::String(raw.clone()),
        }
    }
}

/// Distance in miles between two locations.
pub fn distance_miles(from: Location, to: Location, kind: DistanceType) -> f64 {
    let dx = (to.lon - from.lon).to_radians();
    let dy = (to.lat - from.lat).to_radians();

    match kind {
        DistanceType::Plane => {
            let mean_lat = ((from.lat + to.lat) / 2.0).to_radians();
            let x = dx * mean_lat.cos();
            (x * x + dy * dy).sqrt() * EARTH_RADIUS_MILES
        }
        DistanceType::Arc => {
            let a = (dy / 2.0).sin().powi(2)
                + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (dx / 2.0).sin().powi(2);
            let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
            EARTH_RADIUS_MILES * c
        }
    }
}
