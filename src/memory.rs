use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use uuid::Uuid;

use crate::gateway::{
    GatewayError, RemoteGateway, RosterRow, ScheduleEntryDraft, ScheduleFilter, ScopeKey,
};
use crate::schedule::{parse_hhmm, DayWindow, ScheduleEntry, TimeSlot, Weekday};

pub const SEED_FILE: &str = "eduxel_seed.json";

/// In-memory stand-in for the Eduxel REST backend. It enforces the gateway
/// contract authoritatively: overlap rejection on create, unknown-id and
/// unknown-scope errors, and all-or-nothing batch submits.
///
/// Seeded from `eduxel_seed.json` in the selected workspace; the production
/// embedder swaps in its own `RemoteGateway` over HTTP instead.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    window: DayWindow,
    classes: BTreeSet<String>,
    teachers: BTreeSet<String>,
    subjects: BTreeSet<String>,
    rooms: BTreeSet<String>,
    /// student id -> class id
    students: BTreeMap<String, String>,
    entries: BTreeMap<String, ScheduleEntry>,
    roster: BTreeMap<ScopeKey, BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct SeedRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedStudent {
    id: String,
    class_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedTimetable {
    id: String,
    class_id: String,
    day_of_week: String,
    start_time: String,
    end_time: String,
    subject_id: String,
    teacher_id: String,
    #[serde(default)]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedAttendance {
    class_id: String,
    date: String,
    student_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedGrade {
    class_id: String,
    exam_id: String,
    student_id: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedFile {
    #[serde(default)]
    classes: Vec<SeedRef>,
    #[serde(default)]
    teachers: Vec<SeedRef>,
    #[serde(default)]
    subjects: Vec<SeedRef>,
    #[serde(default)]
    rooms: Vec<SeedRef>,
    #[serde(default)]
    students: Vec<SeedStudent>,
    #[serde(default)]
    timetables: Vec<SeedTimetable>,
    #[serde(default)]
    attendance: Vec<SeedAttendance>,
    #[serde(default)]
    grades: Vec<SeedGrade>,
}

/// Open a workspace directory, loading `eduxel_seed.json` when present.
/// A missing seed file yields an empty backend.
pub fn open_workspace(workspace: &Path) -> anyhow::Result<MemoryGateway> {
    std::fs::create_dir_all(workspace)?;
    let seed_path = workspace.join(SEED_FILE);
    if !seed_path.is_file() {
        return Ok(MemoryGateway::new());
    }
    let raw = std::fs::read_to_string(&seed_path)
        .with_context(|| format!("read {}", seed_path.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", seed_path.display()))?;
    MemoryGateway::from_seed(seed)
}

impl MemoryGateway {
    pub fn new() -> MemoryGateway {
        MemoryGateway::default()
    }

    fn from_seed(seed: SeedFile) -> anyhow::Result<MemoryGateway> {
        let mut gw = MemoryGateway::new();
        for c in seed.classes {
            gw.add_class(&c.id);
        }
        for t in seed.teachers {
            gw.add_teacher(&t.id);
        }
        for s in seed.subjects {
            gw.add_subject(&s.id);
        }
        for r in seed.rooms {
            gw.add_room(&r.id);
        }
        for s in seed.students {
            if !gw.classes.contains(&s.class_id) {
                bail!("student {} references unknown class {}", s.id, s.class_id);
            }
            gw.add_student(&s.id, &s.class_id);
        }
        for t in seed.timetables {
            let weekday = Weekday::parse(&t.day_of_week)
                .with_context(|| format!("timetable {}: bad dayOfWeek {:?}", t.id, t.day_of_week))?;
            let start = parse_hhmm(&t.start_time)
                .with_context(|| format!("timetable {}: bad startTime {:?}", t.id, t.start_time))?;
            let end = parse_hhmm(&t.end_time)
                .with_context(|| format!("timetable {}: bad endTime {:?}", t.id, t.end_time))?;
            let slot = TimeSlot::create(start, end, &gw.window)
                .with_context(|| format!("timetable {}", t.id))?;
            let entry = ScheduleEntry::create(
                t.id.clone(),
                weekday,
                slot,
                t.subject_id,
                t.teacher_id,
                t.room_id,
                t.class_id,
            )
            .with_context(|| format!("timetable {}", t.id))?;
            gw.check_refs(&entry)
                .map_err(|e| anyhow::anyhow!("timetable {}: {}", t.id, e))?;
            // Seeded overlaps are kept as-is: backend data can already hold
            // conflicts, which the client surfaces as advisory warnings.
            gw.entries.insert(entry.id.clone(), entry);
        }
        for a in seed.attendance {
            let date = chrono::NaiveDate::parse_from_str(&a.date, "%Y-%m-%d")
                .with_context(|| format!("attendance row: bad date {:?}", a.date))?;
            if gw.students.get(&a.student_id) != Some(&a.class_id) {
                bail!(
                    "attendance row: student {} is not in class {}",
                    a.student_id,
                    a.class_id
                );
            }
            gw.roster
                .entry(ScopeKey::attendance(&a.class_id, date))
                .or_default()
                .insert(a.student_id, a.status);
        }
        for g in seed.grades {
            if gw.students.get(&g.student_id) != Some(&g.class_id) {
                bail!(
                    "grade row: student {} is not in class {}",
                    g.student_id,
                    g.class_id
                );
            }
            gw.roster
                .entry(ScopeKey::grades(&g.class_id, &g.exam_id))
                .or_default()
                .insert(g.student_id, g.value);
        }
        Ok(gw)
    }

    pub fn add_class(&mut self, id: &str) {
        self.classes.insert(id.to_string());
    }

    pub fn add_teacher(&mut self, id: &str) {
        self.teachers.insert(id.to_string());
    }

    pub fn add_subject(&mut self, id: &str) {
        self.subjects.insert(id.to_string());
    }

    pub fn add_room(&mut self, id: &str) {
        self.rooms.insert(id.to_string());
    }

    pub fn add_student(&mut self, id: &str, class_id: &str) {
        self.students.insert(id.to_string(), class_id.to_string());
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn check_refs(&self, entry: &ScheduleEntry) -> Result<(), GatewayError> {
        if !self.classes.contains(&entry.class_id) {
            return Err(GatewayError::Validation(format!(
                "unknown class {}",
                entry.class_id
            )));
        }
        if !self.teachers.contains(&entry.teacher_id) {
            return Err(GatewayError::Validation(format!(
                "unknown teacher {}",
                entry.teacher_id
            )));
        }
        if !self.subjects.contains(&entry.subject_id) {
            return Err(GatewayError::Validation(format!(
                "unknown subject {}",
                entry.subject_id
            )));
        }
        if let Some(room) = &entry.room_id {
            if !self.rooms.contains(room) {
                return Err(GatewayError::Validation(format!("unknown room {}", room)));
            }
        }
        Ok(())
    }

    fn overlapping_ids(&self, candidate: &ScheduleEntry) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.conflicts_with(candidate))
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl RemoteGateway for MemoryGateway {
    fn list_schedule_entries(
        &self,
        filter: &ScheduleFilter,
    ) -> Result<Vec<ScheduleEntry>, GatewayError> {
        let mut out: Vec<ScheduleEntry> = self
            .entries
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.weekday, a.slot.start(), &a.id).cmp(&(b.weekday, b.slot.start(), &b.id))
        });
        Ok(out)
    }

    fn create_schedule_entry(
        &mut self,
        draft: &ScheduleEntryDraft,
    ) -> Result<ScheduleEntry, GatewayError> {
        let entry = ScheduleEntry::create(
            Uuid::new_v4().to_string(),
            draft.weekday,
            draft.slot,
            draft.subject_id.clone(),
            draft.teacher_id.clone(),
            draft.room_id.clone(),
            draft.class_id.clone(),
        )
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
        self.check_refs(&entry)?;
        let clashes = self.overlapping_ids(&entry);
        if !clashes.is_empty() {
            return Err(GatewayError::Conflict { entry_ids: clashes });
        }
        self.entries.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    fn delete_schedule_entry(&mut self, entry_id: &str) -> Result<(), GatewayError> {
        match self.entries.remove(entry_id) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound(format!(
                "schedule entry {} not found",
                entry_id
            ))),
        }
    }

    fn load_roster(&self, scope: &ScopeKey) -> Result<Vec<RosterRow>, GatewayError> {
        if !self.classes.contains(&scope.class_id) {
            return Err(GatewayError::NotFound(format!(
                "unknown class {}",
                scope.class_id
            )));
        }
        let rows = self
            .roster
            .get(scope)
            .map(|m| {
                m.iter()
                    .map(|(id, v)| RosterRow::new(id.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    fn submit_roster_batch(
        &mut self,
        scope: &ScopeKey,
        entries: &[RosterRow],
    ) -> Result<(), GatewayError> {
        if !self.classes.contains(&scope.class_id) {
            return Err(GatewayError::NotFound(format!(
                "unknown class {}",
                scope.class_id
            )));
        }
        for row in entries {
            if row.value.trim().is_empty() {
                return Err(GatewayError::Validation(format!(
                    "empty value for student {}",
                    row.student_id
                )));
            }
        }
        let failed: Vec<String> = entries
            .iter()
            .filter(|r| self.students.get(&r.student_id) != Some(&scope.class_id))
            .map(|r| r.student_id.clone())
            .collect();
        if !failed.is_empty() {
            // All-or-nothing: nothing is applied when any row is refused.
            return Err(GatewayError::PartialFailure {
                failed_student_ids: failed,
            });
        }
        let sheet = self.roster.entry(scope.clone()).or_default();
        for row in entries {
            sheet.insert(row.student_id.clone(), row.value.clone());
        }
        Ok(())
    }
}
