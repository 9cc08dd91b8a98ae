//! Time slot catalogs and the past-slot rule.
//!
//! Two catalogs exist. Reservation slots are half-hour start points
//! (`"7:00pm"`); pick-up slots are quarter-hour ranges (`"7:00pm - 7:15pm"`).
//! Both obey the same rule: a slot whose start lies before "now" in the
//! venue's local time is past, and callers must not let anyone pick it.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors parsing or resolving a slot label
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// The label could not be parsed as a time of day
    #[error("Invalid slot '{label}': {reason}")]
    Unparseable {
        /// The offending label
        label: String,
        /// What was wrong with it
        reason: &'static str,
    },

    /// The label parsed but is not part of the catalog
    #[error("Slot '{label}' is not offered for {kind} bookings")]
    NotInCatalog {
        /// The offending label
        label: String,
        /// The catalog that was consulted
        kind: SlotKind,
    },

    /// Opening and closing times leave no room for a single slot
    #[error("Opening time {opening} leaves no slots before closing time {closing}")]
    EmptyCatalog {
        /// Opening time
        opening: NaiveTime,
        /// Closing time
        closing: NaiveTime,
    },
}

/// Which catalog a slot belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Table reservations, half-hour start points
    Reservation,
    /// Order pick-ups, quarter-hour ranges
    Pickup,
}

impl SlotKind {
    /// Spacing between consecutive slots
    #[must_use]
    pub const fn step_minutes(self) -> i64 {
        match self {
            Self::Reservation => 30,
            Self::Pickup => 15,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reservation => f.write_str("reservation"),
            Self::Pickup => f.write_str("pickup"),
        }
    }
}

/// A slot label drawn from a catalog.
///
/// Equality, hashing and ordering use the parsed times, so `"7:00PM"` and
/// `"7:00pm"` are the same slot. The canonical label is lowercase with no
/// leading zero on the hour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot {
    label: String,
    start: NaiveTime,
    end: Option<NaiveTime>,
}

impl TimeSlot {
    /// Parse a reservation point (`"7:00pm"`) or a pick-up range
    /// (`"7:00pm - 7:15pm"`).
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Unparseable`] if either time is malformed or a
    /// range ends before it starts.
    pub fn parse(label: &str) -> Result<Self, SlotError> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Err(SlotError::Unparseable {
                label: label.to_string(),
                reason: "empty label",
            });
        }

        match trimmed.split_once('-') {
            None => {
                let start = parse_clock(trimmed).ok_or_else(|| SlotError::Unparseable {
                    label: label.to_string(),
                    reason: "expected a time such as 7:00pm",
                })?;
                Ok(Self::point(start))
            }
            Some((from, to)) => {
                let (Some(start), Some(end)) = (parse_clock(from.trim()), parse_clock(to.trim()))
                else {
                    return Err(SlotError::Unparseable {
                        label: label.to_string(),
                        reason: "expected a range such as 7:00pm - 7:15pm",
                    });
                };
                if end <= start {
                    return Err(SlotError::Unparseable {
                        label: label.to_string(),
                        reason: "range must end after it starts",
                    });
                }
                Ok(Self::range(start, end))
            }
        }
    }

    /// A single start point
    #[must_use]
    pub fn point(start: NaiveTime) -> Self {
        Self {
            label: format_clock(start),
            start,
            end: None,
        }
    }

    /// A start/end range
    #[must_use]
    pub fn range(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            label: format!("{} - {}", format_clock(start), format_clock(end)),
            start,
            end: Some(end),
        }
    }

    /// Canonical label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Local start time
    #[must_use]
    pub const fn start(&self) -> NaiveTime {
        self.start
    }

    /// Local end time, for ranges
    #[must_use]
    pub const fn end(&self) -> Option<NaiveTime> {
        self.end
    }
}

impl PartialEq for TimeSlot {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl Eq for TimeSlot {}

impl Hash for TimeSlot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl PartialOrd for TimeSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.start, self.end).cmp(&(other.start, other.end))
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = SlotError;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        Self::parse(&label)
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.label
    }
}

/// Parse `h:mmam` / `h:mmpm`, case-insensitive.
fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let lower = raw.trim().to_ascii_lowercase();
    let (digits, pm) = if let Some(rest) = lower.strip_suffix("pm") {
        (rest.trim_end(), true)
    } else if let Some(rest) = lower.strip_suffix("am") {
        (rest.trim_end(), false)
    } else {
        return None;
    };

    let (hour, minute) = digits.split_once(':')?;
    if minute.len() != 2 {
        return None;
    }
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }

    let hour24 = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };
    NaiveTime::from_hms_opt(hour24, minute, 0)
}

fn format_clock(time: NaiveTime) -> String {
    let (pm, hour) = time.hour12();
    format!("{hour}:{:02}{}", time.minute(), if pm { "pm" } else { "am" })
}

/// Ordered list of slots offered for one kind of booking
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotCatalog {
    kind: SlotKind,
    slots: Vec<TimeSlot>,
}

impl SlotCatalog {
    /// Build the catalog for `kind` between `opening` and `closing`.
    ///
    /// Reservation points start every 30 minutes and the last one starts 30
    /// minutes before closing. Pick-up ranges are 15 minutes wide and the last
    /// one ends at closing.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::EmptyCatalog`] when no slot fits.
    pub fn between(
        kind: SlotKind,
        opening: NaiveTime,
        closing: NaiveTime,
    ) -> Result<Self, SlotError> {
        let step = Duration::minutes(kind.step_minutes());
        let mut slots = Vec::new();
        let mut start = opening;

        loop {
            let (end, wrapped) = start.overflowing_add_signed(step);
            if wrapped != 0 || end > closing {
                break;
            }
            slots.push(match kind {
                SlotKind::Reservation => TimeSlot::point(start),
                SlotKind::Pickup => TimeSlot::range(start, end),
            });
            start = end;
        }

        if slots.is_empty() {
            return Err(SlotError::EmptyCatalog { opening, closing });
        }
        Ok(Self { kind, slots })
    }

    /// The kind of booking this catalog serves
    #[must_use]
    pub const fn kind(&self) -> SlotKind {
        self.kind
    }

    /// All slots in order
    #[must_use]
    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    /// Parse `label` and check that it belongs to this catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Unparseable`] for malformed labels and
    /// [`SlotError::NotInCatalog`] for well-formed labels this catalog does
    /// not offer.
    pub fn resolve(&self, label: &str) -> Result<TimeSlot, SlotError> {
        let slot = TimeSlot::parse(label)?;
        if self.slots.contains(&slot) {
            Ok(slot)
        } else {
            Err(SlotError::NotInCatalog {
                label: label.to_string(),
                kind: self.kind,
            })
        }
    }

    /// Whether the catalog offers `slot`
    #[must_use]
    pub fn contains(&self, slot: &TimeSlot) -> bool {
        self.slots.contains(slot)
    }
}

/// The venue's local clock and its two slot catalogs
#[derive(Clone, Debug)]
pub struct Venue {
    utc_offset: FixedOffset,
    reservation: SlotCatalog,
    pickup: SlotCatalog,
}

impl Venue {
    /// Build a venue open from `opening` to `closing` local time.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::EmptyCatalog`] if the opening hours are too short
    /// for a reservation slot.
    pub fn new(
        utc_offset: FixedOffset,
        opening: NaiveTime,
        closing: NaiveTime,
    ) -> Result<Self, SlotError> {
        Ok(Self {
            utc_offset,
            reservation: SlotCatalog::between(SlotKind::Reservation, opening, closing)?,
            pickup: SlotCatalog::between(SlotKind::Pickup, opening, closing)?,
        })
    }

    /// Catalog for the given booking kind
    #[must_use]
    pub const fn catalog(&self, kind: SlotKind) -> &SlotCatalog {
        match kind {
            SlotKind::Reservation => &self.reservation,
            SlotKind::Pickup => &self.pickup,
        }
    }

    /// Venue-local wall-clock time for `now`
    #[must_use]
    pub fn local_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.utc_offset).naive_local()
    }

    /// Venue-local calendar day for `now`
    #[must_use]
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_now(now).date()
    }

    /// Whether (`date`, `slot`) starts before `now`
    #[must_use]
    pub fn is_past(&self, date: NaiveDate, slot: &TimeSlot, now: DateTime<Utc>) -> bool {
        NaiveDateTime::new(date, slot.start()) < self.local_now(now)
    }
}
