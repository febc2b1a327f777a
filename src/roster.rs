use std::collections::BTreeMap;
use std::fmt;

use crate::gateway::{GatewayError, RemoteGateway, RosterRow, ScopeKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    /// A commit is already outstanding for this session; only one may be in
    /// flight, since two would race on the baseline replacement.
    CommitInFlight,
    Gateway(GatewayError),
}

impl fmt::Display for RosterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosterError::CommitInFlight => write!(f, "a commit is already in flight"),
            RosterError::Gateway(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RosterError {}

/// UI edits arrive as explicit commands so the state machine stays testable
/// without any view toolkit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterCommand {
    SetValue { student_id: String, value: String },
    Reset,
    Commit,
}

/// The batch handed to the gateway by a commit: exactly the dirty set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterBatch {
    pub scope: ScopeKey,
    pub entries: Vec<RosterRow>,
}

/// In-memory draft of per-student edits for one roster sheet.
///
/// `draft` only ever holds values that differ from `baseline`, so dirtiness
/// is just non-emptiness. Commit sends the dirty set as one batch; failure
/// leaves the draft untouched for retry, success folds it into the baseline.
#[derive(Debug, Clone)]
pub struct RosterEditSession {
    scope: ScopeKey,
    baseline: BTreeMap<String, String>,
    draft: BTreeMap<String, String>,
    commit_in_flight: bool,
}

impl RosterEditSession {
    /// Fresh session for a newly selected sheet: baseline replaced, draft
    /// cleared, always starts clean.
    pub fn load(scope: ScopeKey, baseline: impl IntoIterator<Item = RosterRow>) -> Self {
        RosterEditSession {
            scope,
            baseline: baseline
                .into_iter()
                .map(|r| (r.student_id, r.value))
                .collect(),
            draft: BTreeMap::new(),
            commit_in_flight: false,
        }
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    /// Record an edit. Setting a cell back to its baseline value removes it
    /// from the draft, so reverted edits leave the session clean.
    pub fn set_value(&mut self, student_id: &str, value: &str) {
        if self.baseline.get(student_id).map(String::as_str) == Some(value) {
            self.draft.remove(student_id);
        } else {
            self.draft.insert(student_id.to_string(), value.to_string());
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.draft.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.draft.len()
    }

    pub fn commit_in_flight(&self) -> bool {
        self.commit_in_flight
    }

    pub fn baseline_value(&self, student_id: &str) -> Option<&str> {
        self.baseline.get(student_id).map(String::as_str)
    }

    /// Value as the user currently sees it: draft overlaid on baseline.
    pub fn current_value(&self, student_id: &str) -> Option<&str> {
        self.draft
            .get(student_id)
            .or_else(|| self.baseline.get(student_id))
            .map(String::as_str)
    }

    /// Baseline with the draft overlaid, plus the per-row dirty flag.
    pub fn rows(&self) -> Vec<(String, String, bool)> {
        let mut out: Vec<(String, String, bool)> = Vec::new();
        for (id, value) in &self.baseline {
            match self.draft.get(id) {
                Some(v) => out.push((id.clone(), v.clone(), true)),
                None => out.push((id.clone(), value.clone(), false)),
            }
        }
        for (id, v) in &self.draft {
            if !self.baseline.contains_key(id) {
                out.push((id.clone(), v.clone(), true));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Discard all edits without committing.
    pub fn reset(&mut self) {
        self.draft.clear();
    }

    /// First half of a commit: snapshot the dirty set and mark the commit
    /// in flight. `Ok(None)` means clean, nothing to send.
    pub fn begin_commit(&mut self) -> Result<Option<RosterBatch>, RosterError> {
        if self.commit_in_flight {
            return Err(RosterError::CommitInFlight);
        }
        if self.draft.is_empty() {
            return Ok(None);
        }
        self.commit_in_flight = true;
        Ok(Some(RosterBatch {
            scope: self.scope.clone(),
            entries: self
                .draft
                .iter()
                .map(|(id, v)| RosterRow::new(id.clone(), v.clone()))
                .collect(),
        }))
    }

    /// Second half: apply the gateway outcome. Success folds the draft into
    /// the baseline and clears it; failure keeps every edit for retry.
    pub fn finish_commit(&mut self, outcome: Result<(), GatewayError>) -> Result<(), RosterError> {
        self.commit_in_flight = false;
        match outcome {
            Ok(()) => {
                let draft = std::mem::take(&mut self.draft);
                self.baseline.extend(draft);
                Ok(())
            }
            Err(e) => Err(RosterError::Gateway(e)),
        }
    }

    /// Synchronous commit convenience: one batch call, returns how many
    /// cells were committed. Clean sessions are a no-op success.
    pub fn commit(&mut self, gateway: &mut dyn RemoteGateway) -> Result<usize, RosterError> {
        let Some(batch) = self.begin_commit()? else {
            return Ok(0);
        };
        let count = batch.entries.len();
        let outcome = gateway.submit_roster_batch(&batch.scope, &batch.entries);
        self.finish_commit(outcome)?;
        Ok(count)
    }

    pub fn apply(
        &mut self,
        command: RosterCommand,
        gateway: &mut dyn RemoteGateway,
    ) -> Result<usize, RosterError> {
        match command {
            RosterCommand::SetValue { student_id, value } => {
                self.set_value(&student_id, &value);
                Ok(0)
            }
            RosterCommand::Reset => {
                self.reset();
                Ok(0)
            }
            RosterCommand::Commit => self.commit(gateway),
        }
    }
}

/// Ticket for one roster load; completions carry it back so late responses
/// for an abandoned selection can be recognized and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    seq: u64,
    scope: ScopeKey,
}

/// Page-level coordinator: owns the current sheet selection, the session,
/// and the monotonic load sequence that guards against stale responses.
#[derive(Debug, Default)]
pub struct RosterController {
    latest_seq: u64,
    selected: Option<ScopeKey>,
    session: Option<RosterEditSession>,
}

impl RosterController {
    pub fn new() -> RosterController {
        RosterController::default()
    }

    /// Switch selection. The old session is dropped immediately (edits for
    /// a sheet the user left are discarded, per the session lifecycle) and
    /// a ticket for the matching load is issued.
    pub fn select(&mut self, scope: ScopeKey) -> LoadTicket {
        self.latest_seq += 1;
        self.selected = Some(scope.clone());
        self.session = None;
        LoadTicket {
            seq: self.latest_seq,
            scope,
        }
    }

    /// Apply a completed load. Returns false (and changes nothing) when the
    /// ticket is stale: superseded by a newer load or for a scope that is
    /// no longer selected.
    pub fn apply_load(&mut self, ticket: LoadTicket, baseline: Vec<RosterRow>) -> bool {
        if ticket.seq != self.latest_seq || self.selected.as_ref() != Some(&ticket.scope) {
            return false;
        }
        self.session = Some(RosterEditSession::load(ticket.scope, baseline));
        true
    }

    pub fn selected(&self) -> Option<&ScopeKey> {
        self.selected.as_ref()
    }

    pub fn session(&self) -> Option<&RosterEditSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut RosterEditSession> {
        self.session.as_mut()
    }

    pub fn clear(&mut self) {
        self.latest_seq += 1;
        self.selected = None;
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ScheduleEntryDraft, ScheduleFilter};
    use crate::schedule::ScheduleEntry;

    /// Gateway double: records batches, fails on demand.
    struct RecordingGateway {
        submitted: Vec<(ScopeKey, Vec<RosterRow>)>,
        fail_with: Option<GatewayError>,
    }

    impl RecordingGateway {
        fn ok() -> Self {
            RecordingGateway {
                submitted: Vec::new(),
                fail_with: None,
            }
        }

        fn failing(err: GatewayError) -> Self {
            RecordingGateway {
                submitted: Vec::new(),
                fail_with: Some(err),
            }
        }
    }

    impl RemoteGateway for RecordingGateway {
        fn list_schedule_entries(
            &self,
            _filter: &ScheduleFilter,
        ) -> Result<Vec<ScheduleEntry>, GatewayError> {
            Ok(Vec::new())
        }

        fn create_schedule_entry(
            &mut self,
            _draft: &ScheduleEntryDraft,
        ) -> Result<ScheduleEntry, GatewayError> {
            Err(GatewayError::Validation("not under test".to_string()))
        }

        fn delete_schedule_entry(&mut self, _entry_id: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        fn load_roster(&self, _scope: &ScopeKey) -> Result<Vec<RosterRow>, GatewayError> {
            Ok(Vec::new())
        }

        fn submit_roster_batch(
            &mut self,
            scope: &ScopeKey,
            entries: &[RosterRow],
        ) -> Result<(), GatewayError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            self.submitted.push((scope.clone(), entries.to_vec()));
            Ok(())
        }
    }

    fn scope() -> ScopeKey {
        ScopeKey::attendance(
            "5",
            chrono::NaiveDate::from_ymd_opt(2024, 10, 1).expect("date"),
        )
    }

    fn session() -> RosterEditSession {
        RosterEditSession::load(
            scope(),
            vec![
                RosterRow::new("1", "present"),
                RosterRow::new("2", "present"),
                RosterRow::new("7", "present"),
            ],
        )
    }

    #[test]
    fn diverging_then_reverting_a_value_toggles_dirty() {
        let mut s = session();
        assert!(!s.is_dirty());
        s.set_value("7", "absent");
        assert!(s.is_dirty());
        assert_eq!(s.current_value("7"), Some("absent"));
        assert_eq!(s.baseline_value("7"), Some("present"));
        s.set_value("7", "present");
        assert!(!s.is_dirty());
    }

    #[test]
    fn setting_a_value_for_an_unrecorded_student_is_dirty() {
        let mut s = session();
        s.set_value("9", "late");
        assert!(s.is_dirty());
        assert_eq!(s.current_value("9"), Some("late"));
        assert_eq!(s.baseline_value("9"), None);
    }

    #[test]
    fn commit_sends_exactly_the_dirty_set_once() {
        let mut s = session();
        s.set_value("2", "absent");
        let mut gw = RecordingGateway::ok();
        let committed = s.commit(&mut gw).expect("commit");
        assert_eq!(committed, 1);
        assert_eq!(gw.submitted.len(), 1);
        let (sent_scope, sent_entries) = &gw.submitted[0];
        assert_eq!(sent_scope, &scope());
        assert_eq!(sent_entries, &vec![RosterRow::new("2", "absent")]);
        assert!(!s.is_dirty());
        // New baseline reflects the committed value.
        assert_eq!(s.baseline_value("2"), Some("absent"));
    }

    #[test]
    fn clean_commit_is_a_no_op_success() {
        let mut s = session();
        let mut gw = RecordingGateway::ok();
        assert_eq!(s.commit(&mut gw).expect("commit"), 0);
        assert!(gw.submitted.is_empty());
    }

    #[test]
    fn failed_commit_keeps_the_draft_for_retry() {
        let mut s = session();
        s.set_value("1", "absent");
        let mut gw = RecordingGateway::failing(GatewayError::Validation("nope".to_string()));
        let err = s.commit(&mut gw).expect_err("commit should fail");
        assert_eq!(
            err,
            RosterError::Gateway(GatewayError::Validation("nope".to_string()))
        );
        assert!(s.is_dirty());
        assert_eq!(s.current_value("1"), Some("absent"));
        assert_eq!(s.baseline_value("1"), Some("present"));
        assert!(!s.commit_in_flight());

        // Retry against a healthy gateway succeeds with the same batch.
        let mut gw = RecordingGateway::ok();
        assert_eq!(s.commit(&mut gw).expect("retry"), 1);
        assert!(!s.is_dirty());
    }

    #[test]
    fn partial_failure_counts_as_nothing_committed() {
        let mut s = session();
        s.set_value("1", "absent");
        s.set_value("2", "late");
        let mut gw = RecordingGateway::failing(GatewayError::PartialFailure {
            failed_student_ids: vec!["2".to_string()],
        });
        assert!(s.commit(&mut gw).is_err());
        assert_eq!(s.dirty_count(), 2);
        assert_eq!(s.baseline_value("1"), Some("present"));
    }

    #[test]
    fn second_commit_is_rejected_while_one_is_in_flight() {
        let mut s = session();
        s.set_value("1", "absent");
        let batch = s.begin_commit().expect("begin").expect("batch");
        assert_eq!(batch.entries.len(), 1);
        assert!(s.commit_in_flight());
        assert_eq!(s.begin_commit(), Err(RosterError::CommitInFlight));
        // Completion clears the flag either way.
        s.finish_commit(Ok(())).expect("finish");
        assert!(!s.commit_in_flight());
        assert!(!s.is_dirty());
    }

    #[test]
    fn reset_discards_edits_without_committing() {
        let mut s = session();
        s.set_value("1", "absent");
        s.reset();
        assert!(!s.is_dirty());
        assert_eq!(s.current_value("1"), Some("present"));
    }

    #[test]
    fn rows_overlay_draft_on_baseline() {
        let mut s = session();
        s.set_value("2", "absent");
        s.set_value("9", "late");
        let rows = s.rows();
        assert_eq!(
            rows,
            vec![
                ("1".to_string(), "present".to_string(), false),
                ("2".to_string(), "absent".to_string(), true),
                ("7".to_string(), "present".to_string(), false),
                ("9".to_string(), "late".to_string(), true),
            ]
        );
    }

    #[test]
    fn commands_drive_the_session() {
        let mut s = session();
        let mut gw = RecordingGateway::ok();
        s.apply(
            RosterCommand::SetValue {
                student_id: "2".to_string(),
                value: "absent".to_string(),
            },
            &mut gw,
        )
        .expect("set");
        assert!(s.is_dirty());
        assert_eq!(s.apply(RosterCommand::Commit, &mut gw).expect("commit"), 1);
        assert!(!s.is_dirty());
        s.apply(
            RosterCommand::SetValue {
                student_id: "2".to_string(),
                value: "late".to_string(),
            },
            &mut gw,
        )
        .expect("set");
        s.apply(RosterCommand::Reset, &mut gw).expect("reset");
        assert!(!s.is_dirty());
    }

    #[test]
    fn stale_load_by_sequence_is_discarded() {
        let mut c = RosterController::new();
        let first = c.select(scope());
        let second = c.select(ScopeKey::grades("5", "exam-1"));
        // The slow first response arrives after a newer selection.
        assert!(!c.apply_load(first, vec![RosterRow::new("1", "present")]));
        assert!(c.session().is_none());
        assert!(c.apply_load(second, vec![RosterRow::new("1", "12.5")]));
        let session = c.session().expect("session");
        assert_eq!(session.scope(), &ScopeKey::grades("5", "exam-1"));
        assert_eq!(session.current_value("1"), Some("12.5"));
    }

    #[test]
    fn load_for_a_cleared_selection_is_discarded() {
        let mut c = RosterController::new();
        let ticket = c.select(scope());
        c.clear();
        assert!(!c.apply_load(ticket, vec![RosterRow::new("1", "present")]));
        assert!(c.session().is_none());
    }

    #[test]
    fn reselecting_a_sheet_drops_pending_edits() {
        let mut c = RosterController::new();
        let t = c.select(scope());
        c.apply_load(t, vec![RosterRow::new("1", "present")]);
        c.session_mut().expect("session").set_value("1", "absent");
        let t = c.select(scope());
        assert!(c.session().is_none());
        c.apply_load(t, vec![RosterRow::new("1", "present")]);
        assert!(!c.session().expect("session").is_dirty());
    }
}
