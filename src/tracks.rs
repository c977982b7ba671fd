use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown basin code: {0}")]
    UnknownBasin(String),

    #[error("record {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
}

/// The seven standard ocean basins used to stratify TC climatology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basin {
    /// North Atlantic
    NA,
    /// East Pacific
    EP,
    /// West Pacific
    WP,
    /// North Indian
    NI,
    /// South Indian
    SI,
    /// South Pacific
    SP,
    /// South Atlantic
    SA,
}

impl Basin {
    pub const ALL: [Basin; 7] = [
        Basin::NA,
        Basin::EP,
        Basin::WP,
        Basin::NI,
        Basin::SI,
        Basin::SP,
        Basin::SA,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Basin::NA => "NA",
            Basin::EP => "EP",
            Basin::WP => "WP",
            Basin::NI => "NI",
            Basin::SI => "SI",
            Basin::SP => "SP",
            Basin::SA => "SA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Basin::NA => "North Atlantic",
            Basin::EP => "East Pacific",
            Basin::WP => "West Pacific",
            Basin::NI => "North Indian",
            Basin::SI => "South Indian",
            Basin::SP => "South Pacific",
            Basin::SA => "South Atlantic",
        }
    }
}

impl FromStr for Basin {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NA" => Ok(Basin::NA),
            "EP" => Ok(Basin::EP),
            "WP" => Ok(Basin::WP),
            "NI" => Ok(Basin::NI),
            "SI" => Ok(Basin::SI),
            "SP" => Ok(Basin::SP),
            "SA" => Ok(Basin::SA),
            other => Err(TrackError::UnknownBasin(other.to_string())),
        }
    }
}

impl std::fmt::Display for Basin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One 6-hourly best-track position fix
#[derive(Debug, Clone, PartialEq)]
pub struct TcObservation {
    pub storm_id: String,
    pub basin: Basin,
    pub time: DateTime<Utc>,
    /// Latitude (degrees north)
    pub lat: f64,
    /// Longitude normalized to [0, 360)
    pub lon: f64,
    /// Maximum sustained wind (m/s)
    pub max_wind_ms: f64,
    /// Minimum central pressure (hPa), where reported
    pub min_pressure_hpa: Option<f64>,
}

/// Raw CSV layout of the best-track archive
#[derive(Debug, Deserialize)]
struct RawTrackRecord {
    storm_id: String,
    basin: String,
    time: String,
    lat: f64,
    lon: f64,
    max_wind_ms: f64,
    #[serde(default)]
    min_pressure_hpa: Option<f64>,
}

/// Load best-track observations for one basin and year range, applying the
/// minimum-wind threshold. Observations below the threshold are excluded,
/// not zero-filled. The result is sorted by (storm id, time) so per-storm
/// fixes are chronologically ordered for translation-speed computation.
pub fn load_tracks(
    path: &Path,
    basin: Basin,
    start_year: i32,
    end_year: i32,
    min_wind_ms: f64,
) -> Result<Vec<TcObservation>, TrackError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut observations = Vec::new();

    for (idx, record) in reader.deserialize::<RawTrackRecord>().enumerate() {
        let line = idx + 2; // header is line 1
        let raw = record?;

        let record_basin: Basin = raw.basin.parse()?;
        if record_basin != basin {
            continue;
        }

        let time = parse_track_time(&raw.time).map_err(|reason| TrackError::InvalidRecord {
            line,
            reason,
        })?;
        if time.year() < start_year || time.year() > end_year {
            continue;
        }
        if raw.max_wind_ms < min_wind_ms {
            continue;
        }
        if !(-90.0..=90.0).contains(&raw.lat) {
            return Err(TrackError::InvalidRecord {
                line,
                reason: format!("latitude out of range: {}", raw.lat),
            });
        }

        observations.push(TcObservation {
            storm_id: raw.storm_id,
            basin: record_basin,
            time,
            lat: raw.lat,
            lon: normalize_longitude(raw.lon),
            max_wind_ms: raw.max_wind_ms,
            min_pressure_hpa: raw.min_pressure_hpa,
        });
    }

    observations.sort_by(|a, b| a.storm_id.cmp(&b.storm_id).then(a.time.cmp(&b.time)));
    debug!(
        count = observations.len(),
        basin = %basin,
        "loaded best-track observations"
    );
    Ok(observations)
}

/// Normalize a longitude to [0, 360), the convention of the reanalysis grids
pub fn normalize_longitude(lon: f64) -> f64 {
    let mut lon = lon % 360.0;
    if lon < 0.0 {
        lon += 360.0;
    }
    lon
}

fn parse_track_time(s: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .map_err(|_| format!("invalid timestamp: {}", s))
}
