use std::collections::BTreeMap;
use std::fmt;

/// Display window for a school day, minutes from midnight.
/// The Eduxel grid shows 08:00 to 18:00 by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl Default for DayWindow {
    fn default() -> Self {
        DayWindow {
            start_minute: 8 * 60,
            end_minute: 18 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 6] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    /// Wire form used by the Eduxel backend (`day_of_week` column).
    /// Sunday is not a school day and is rejected.
    pub fn parse(s: &str) -> Option<Weekday> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" => Some(Weekday::Monday),
            "tuesday" => Some(Weekday::Tuesday),
            "wednesday" => Some(Weekday::Wednesday),
            "thursday" => Some(Weekday::Thursday),
            "friday" => Some(Weekday::Friday),
            "saturday" => Some(Weekday::Saturday),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    InvalidRange { start: u16, end: u16 },
    InvalidEntry { field: &'static str },
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::InvalidRange { .. } => "invalid_range",
            ScheduleError::InvalidEntry { .. } => "invalid_entry",
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::InvalidRange { start, end } => {
                write!(f, "invalid time range {}..{}", start, end)
            }
            ScheduleError::InvalidEntry { field } => write!(f, "missing {}", field),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Parse `"HH:MM"` into a minute-of-day. Seconds (as in backend
/// `start_time` strings like `"09:00:00"`) are accepted and ignored.
pub fn parse_hhmm(s: &str) -> Option<u16> {
    let t = s.trim();
    let mut parts = t.split(':');
    let h: u16 = parts.next()?.parse().ok()?;
    let m: u16 = parts.next()?.parse().ok()?;
    if let Some(sec) = parts.next() {
        let _: u16 = sec.parse().ok()?;
    }
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

pub fn format_minutes(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Half-open interval within one day. Immutable once constructed;
/// `create` is the only way in, so a `TimeSlot` is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    start: u16,
    end: u16,
}

impl TimeSlot {
    pub fn create(start: u16, end: u16, window: &DayWindow) -> Result<TimeSlot, ScheduleError> {
        if end <= start || start < window.start_minute || end > window.end_minute {
            return Err(ScheduleError::InvalidRange { start, end });
        }
        Ok(TimeSlot { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end - self.start
    }

    /// Half-open overlap: `[a,b)` and `[b,c)` do not overlap.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One timetable line: a slot bound to subject, teacher, room and class.
/// Entries are never edited in place; the frontend deletes and recreates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: String,
    pub weekday: Weekday,
    pub slot: TimeSlot,
    pub subject_id: String,
    pub teacher_id: String,
    pub room_id: Option<String>,
    pub class_id: String,
}

impl ScheduleEntry {
    pub fn create(
        id: impl Into<String>,
        weekday: Weekday,
        slot: TimeSlot,
        subject_id: impl Into<String>,
        teacher_id: impl Into<String>,
        room_id: Option<String>,
        class_id: impl Into<String>,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let subject_id = subject_id.into();
        let teacher_id = teacher_id.into();
        let class_id = class_id.into();
        if subject_id.trim().is_empty() {
            return Err(ScheduleError::InvalidEntry { field: "subjectId" });
        }
        if teacher_id.trim().is_empty() {
            return Err(ScheduleError::InvalidEntry { field: "teacherId" });
        }
        if class_id.trim().is_empty() {
            return Err(ScheduleError::InvalidEntry { field: "classId" });
        }
        let room_id = room_id.filter(|r| !r.trim().is_empty());
        Ok(ScheduleEntry {
            id: id.into(),
            weekday,
            slot,
            subject_id,
            teacher_id,
            room_id,
            class_id,
        })
    }

    /// Advisory conflict rule: same weekday, overlapping slots, and either
    /// the same teacher or the same room.
    pub fn conflicts_with(&self, other: &ScheduleEntry) -> bool {
        if self.weekday != other.weekday || !self.slot.overlaps(&other.slot) {
            return false;
        }
        if self.teacher_id == other.teacher_id {
            return true;
        }
        match (&self.room_id, &other.room_id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Week of entries, bucketed by weekday and ordered by start time.
/// Conflicts are detected but never block insertion: the backend is the
/// authority for rejection, the client only surfaces the warning.
#[derive(Debug, Default, Clone)]
pub struct WeekSchedule {
    days: BTreeMap<Weekday, Vec<ScheduleEntry>>,
}

impl WeekSchedule {
    pub fn new() -> WeekSchedule {
        WeekSchedule::default()
    }

    /// Insert an entry and report the ids of same-day entries it conflicts
    /// with (same teacher or same room, overlapping slots).
    pub fn insert(&mut self, entry: ScheduleEntry) -> Vec<String> {
        let bucket = self.days.entry(entry.weekday).or_default();
        let conflicts: Vec<String> = bucket
            .iter()
            .filter(|e| e.conflicts_with(&entry))
            .map(|e| e.id.clone())
            .collect();
        bucket.push(entry);
        bucket.sort_by_key(|e| e.slot.start());
        conflicts
    }

    /// Remove by id from whichever bucket holds it. No-op when absent.
    pub fn remove(&mut self, entry_id: &str) -> Option<ScheduleEntry> {
        for bucket in self.days.values_mut() {
            if let Some(pos) = bucket.iter().position(|e| e.id == entry_id) {
                return Some(bucket.remove(pos));
            }
        }
        None
    }

    pub fn entries_for(&self, weekday: Weekday) -> &[ScheduleEntry] {
        self.days.get(&weekday).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Canonical iteration order: weekday, then start time.
    pub fn all(&self) -> Vec<&ScheduleEntry> {
        self.days.values().flat_map(|b| b.iter()).collect()
    }

    pub fn len(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All advisory conflict pairs in the week, in canonical order.
    pub fn conflict_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for bucket in self.days.values() {
            for (i, a) in bucket.iter().enumerate() {
                for b in bucket.iter().skip(i + 1) {
                    if a.conflicts_with(b) {
                        pairs.push((a.id.clone(), b.id.clone()));
                    }
                }
            }
        }
        pairs
    }
}
