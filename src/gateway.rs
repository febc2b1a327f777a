use std::fmt;

use chrono::NaiveDate;
use serde_json::json;

use crate::schedule::{ScheduleEntry, TimeSlot, Weekday};

/// What a roster edit is scoped to: an attendance sheet for one date, or a
/// grade sheet for one exam.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeTarget {
    Date(NaiveDate),
    Exam(String),
}

/// Identity of one roster sheet: `(class, date)` or `(class, exam)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScopeKey {
    pub class_id: String,
    pub target: ScopeTarget,
}

impl ScopeKey {
    pub fn attendance(class_id: impl Into<String>, date: NaiveDate) -> ScopeKey {
        ScopeKey {
            class_id: class_id.into(),
            target: ScopeTarget::Date(date),
        }
    }

    pub fn grades(class_id: impl Into<String>, exam_id: impl Into<String>) -> ScopeKey {
        ScopeKey {
            class_id: class_id.into(),
            target: ScopeTarget::Exam(exam_id.into()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match &self.target {
            ScopeTarget::Date(d) => json!({
                "classId": self.class_id,
                "date": d.format("%Y-%m-%d").to_string(),
            }),
            ScopeTarget::Exam(e) => json!({
                "classId": self.class_id,
                "examId": e,
            }),
        }
    }
}

/// Remote failure taxonomy. Local validation errors (`ScheduleError`) never
/// reach the gateway; these are the shapes the backend can answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Backend-detected timetable overlap. Authoritative, unlike the
    /// advisory client-side check.
    Conflict { entry_ids: Vec<String> },
    Validation(String),
    NotFound(String),
    /// Batch submit refused for some students. The whole batch is treated
    /// as not committed.
    PartialFailure { failed_student_ids: Vec<String> },
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Conflict { .. } => "conflict",
            GatewayError::Validation(_) => "validation",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::PartialFailure { .. } => "partial_failure",
        }
    }

    pub fn message(&self) -> String {
        match self {
            GatewayError::Conflict { entry_ids } => {
                format!("schedule conflict with {} existing entr(y/ies)", entry_ids.len())
            }
            GatewayError::Validation(m) | GatewayError::NotFound(m) => m.clone(),
            GatewayError::PartialFailure { failed_student_ids } => {
                format!("{} student(s) rejected, nothing committed", failed_student_ids.len())
            }
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::Conflict { entry_ids } => Some(json!({ "entryIds": entry_ids })),
            GatewayError::PartialFailure { failed_student_ids } => {
                Some(json!({ "failedStudentIds": failed_student_ids }))
            }
            _ => None,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for GatewayError {}

/// Listing filter; the backend accepts `class_id` and/or `teacher_id`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub class_id: Option<String>,
    pub teacher_id: Option<String>,
}

impl ScheduleFilter {
    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        if let Some(c) = &self.class_id {
            if entry.class_id != *c {
                return false;
            }
        }
        if let Some(t) = &self.teacher_id {
            if entry.teacher_id != *t {
                return false;
            }
        }
        true
    }
}

/// Entry as submitted for creation; the backend assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntryDraft {
    pub weekday: Weekday,
    pub slot: TimeSlot,
    pub subject_id: String,
    pub teacher_id: String,
    pub room_id: Option<String>,
    pub class_id: String,
}

/// One `(student, value)` cell, both as loaded baseline and as batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub student_id: String,
    pub value: String,
}

impl RosterRow {
    pub fn new(student_id: impl Into<String>, value: impl Into<String>) -> RosterRow {
        RosterRow {
            student_id: student_id.into(),
            value: value.into(),
        }
    }
}

/// The REST client boundary. The engine only ever sees these five shapes;
/// transport, auth and token refresh live behind the implementation.
pub trait RemoteGateway {
    fn list_schedule_entries(
        &self,
        filter: &ScheduleFilter,
    ) -> Result<Vec<ScheduleEntry>, GatewayError>;

    fn create_schedule_entry(
        &mut self,
        draft: &ScheduleEntryDraft,
    ) -> Result<ScheduleEntry, GatewayError>;

    fn delete_schedule_entry(&mut self, entry_id: &str) -> Result<(), GatewayError>;

    fn load_roster(&self, scope: &ScopeKey) -> Result<Vec<RosterRow>, GatewayError>;

    /// Single-shot batch commit. Any error means nothing was committed.
    fn submit_roster_batch(
        &mut self,
        scope: &ScopeKey,
        entries: &[RosterRow],
    ) -> Result<(), GatewayError>;
}
