//! Photo catalog: discovery, date parsing, date-filtered views and statistics.

use crate::naming;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Input format for user-entered dates.
pub const DATE_INPUT_FORMAT: &str = "%d/%m/%Y";

/// Fewest photos a timelapse can be built from.
pub const MIN_TIMELAPSE_PHOTOS: usize = 2;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read photo directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("photo not found: {0}")]
    NotFound(PathBuf),
    #[error("not a catalog photo name: {0}")]
    InvalidName(String),
    #[error("failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("invalid date {0:?}, expected DD/MM/YYYY")]
    Malformed(String),
    #[error("date range needs both a start and an end date")]
    Incomplete,
    #[error("date range is inverted: {from} is after {to}")]
    Inverted { from: NaiveDate, to: NaiveDate },
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, DateRangeError> {
        if from > to {
            return Err(DateRangeError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    /// Build a range from optional `DD/MM/YYYY` inputs. Neither bound means
    /// "no range"; exactly one bound is an error.
    pub fn from_inputs(from: Option<&str>, to: Option<&str>) -> Result<Option<Self>, DateRangeError> {
        fn non_empty(s: Option<&str>) -> Option<&str> {
            s.map(str::trim).filter(|s| !s.is_empty())
        }
        match (non_empty(from), non_empty(to)) {
            (None, None) => Ok(None),
            (Some(from), Some(to)) => Ok(Some(Self::new(parse_date(from)?, parse_date(to)?)?)),
            _ => Err(DateRangeError::Incomplete),
        }
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

/// Parse a user-entered `DD/MM/YYYY` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, DateRangeError> {
    NaiveDate::parse_from_str(input.trim(), DATE_INPUT_FORMAT)
        .map_err(|_| DateRangeError::Malformed(input.to_string()))
}

/// A persisted photo whose filename parsed into a capture timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPhoto {
    pub captured_at: NaiveDateTime,
    pub path: PathBuf,
}

impl CapturedPhoto {
    pub fn date(&self) -> NaiveDate {
        self.captured_at.date()
    }
}

/// Aggregate statistics over the parseable photos.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogStats {
    pub total: usize,
    pub distinct_days: usize,
    /// Days from first to last photo, both included. Zero when empty.
    pub span_days: i64,
    /// `distinct_days / span_days`, zero when empty.
    pub consistency: f64,
    pub first_day: Option<NaiveDate>,
    pub latest_day: Option<NaiveDate>,
    pub ready_for_timelapse: bool,
}

/// Directory of captured photos.
#[derive(Debug, Clone)]
pub struct PhotoCatalog {
    dir: PathBuf,
}

impl PhotoCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the directory once and freeze the result. Photos written after
    /// this call are not part of the snapshot. A missing directory is an
    /// empty catalog.
    pub fn snapshot(&self) -> Result<CatalogSnapshot, CatalogError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(dir = %self.dir.display(), "photo directory missing; empty catalog");
                return Ok(CatalogSnapshot::default());
            }
            Err(source) => {
                return Err(CatalogError::ReadDir {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| is_photo_candidate(name))
            .collect();
        names.sort();

        let mut snapshot = CatalogSnapshot::default();
        for name in names {
            let path = self.dir.join(&name);
            match naming::parse_photo_file_name(&name) {
                Some(captured_at) => snapshot.photos.push(CapturedPhoto { captured_at, path }),
                None => {
                    tracing::debug!(file = %name, "photo name does not encode a timestamp");
                    snapshot.unparsed.push(path);
                }
            }
        }

        tracing::debug!(
            dir = %self.dir.display(),
            photos = snapshot.photos.len(),
            unparsed = snapshot.unparsed.len(),
            "catalog scanned"
        );
        Ok(snapshot)
    }

    /// Delete one photo by file name.
    pub fn delete(&self, file_name: &str) -> Result<PathBuf, CatalogError> {
        let bare = Path::new(file_name).file_name().and_then(|n| n.to_str());
        if bare != Some(file_name) || !is_photo_candidate(file_name) {
            return Err(CatalogError::InvalidName(file_name.to_string()));
        }

        let path = self.dir.join(file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "photo deleted");
                Ok(path)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CatalogError::NotFound(path)),
            Err(source) => Err(CatalogError::Delete { path, source }),
        }
    }
}

/// Matches the `face_*.jpg` listing pattern, parseable or not.
fn is_photo_candidate(name: &str) -> bool {
    name.starts_with("face_") && name.ends_with(".jpg")
}

/// Frozen view of the photo directory.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    /// Parseable photos in filename order.
    photos: Vec<CapturedPhoto>,
    /// `face_*.jpg` files whose names do not encode a timestamp.
    unparsed: Vec<PathBuf>,
}

impl CatalogSnapshot {
    pub fn photos(&self) -> &[CapturedPhoto] {
        &self.photos
    }

    pub fn unparsed(&self) -> &[PathBuf] {
        &self.unparsed
    }

    /// Photos ordered by capture timestamp, newest first.
    pub fn newest_first(&self) -> Vec<&CapturedPhoto> {
        let mut photos: Vec<&CapturedPhoto> = self.photos.iter().collect();
        photos.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        photos
    }

    /// Photo count per capture day.
    pub fn histogram(&self) -> BTreeMap<NaiveDate, usize> {
        let mut days = BTreeMap::new();
        for photo in &self.photos {
            *days.entry(photo.date()).or_insert(0) += 1;
        }
        days
    }

    pub fn stats(&self) -> CatalogStats {
        let days = self.histogram();
        let first_day = days.keys().next().copied();
        let latest_day = days.keys().next_back().copied();
        let span_days = match (first_day, latest_day) {
            (Some(first), Some(last)) => (last - first).num_days() + 1,
            _ => 0,
        };
        let consistency = if span_days > 0 {
            days.len() as f64 / span_days as f64
        } else {
            0.0
        };

        CatalogStats {
            total: self.photos.len(),
            distinct_days: days.len(),
            span_days,
            consistency,
            first_day,
            latest_day,
            ready_for_timelapse: self.photos.len() >= MIN_TIMELAPSE_PHOTOS,
        }
    }

    /// Range spanning the first and last photo days, if any.
    pub fn default_range(&self) -> Option<DateRange> {
        let first = self.photos.iter().map(CapturedPhoto::date).min()?;
        let last = self.photos.iter().map(CapturedPhoto::date).max()?;
        DateRange::new(first, last).ok()
    }

    /// Photos whose capture day lies in `range`, or all photos without a
    /// range. Filename order is preserved.
    pub fn select(&self, range: Option<&DateRange>) -> Vec<CapturedPhoto> {
        self.photos
            .iter()
            .filter(|p| range.map_or(true, |r| r.contains(p.date())))
            .cloned()
            .collect()
    }
}
