use chrono::NaiveDate;
use serde_json::json;

use crate::gateway::{RemoteGateway, ScopeKey};
use crate::ipc::error::{err, gateway_err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{RosterCommand, RosterEditSession, RosterError};

fn scope_from_params(params: &serde_json::Value) -> Result<ScopeKey, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_opt_str(params, "date")?;
    let exam_id = get_opt_str(params, "examId")?;
    match (date, exam_id) {
        (Some(date), None) => {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
            Ok(ScopeKey::attendance(class_id, date))
        }
        (None, Some(exam_id)) => Ok(ScopeKey::grades(class_id, exam_id)),
        (Some(_), Some(_)) => Err(HandlerErr::bad_params(
            "pass either date or examId, not both",
        )),
        (None, None) => Err(HandlerErr::bad_params("missing date or examId")),
    }
}

fn session_json(session: &RosterEditSession) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = session
        .rows()
        .into_iter()
        .map(|(student_id, value, dirty)| {
            json!({ "studentId": student_id, "value": value, "dirty": dirty })
        })
        .collect();
    json!({
        "scope": session.scope().to_json(),
        "dirty": session.is_dirty(),
        "dirtyCount": session.dirty_count(),
        "commitInFlight": session.commit_in_flight(),
        "rows": rows,
    })
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let scope = match scope_from_params(&req.params) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    // Selection changes first; a failed load leaves it selected but with no
    // session, exactly like an abandoned in-flight load.
    let ticket = state.roster.select(scope.clone());
    let rows = match gateway.load_roster(&scope) {
        Ok(rows) => rows,
        Err(e) => return gateway_err(&req.id, &e),
    };
    let applied = state.roster.apply_load(ticket, rows);
    let session = state
        .roster
        .session()
        .map(session_json)
        .unwrap_or(serde_json::Value::Null);
    ok(&req.id, json!({ "applied": applied, "session": session }))
}

fn handle_command(
    state: &mut AppState,
    req: &Request,
    command: RosterCommand,
) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.roster.session_mut() else {
        return err(&req.id, "no_roster", "open a roster first", None);
    };
    match session.apply(command, gateway as &mut dyn RemoteGateway) {
        Ok(committed) => ok(
            &req.id,
            json!({ "committed": committed, "dirty": session.is_dirty() }),
        ),
        Err(RosterError::CommitInFlight) => err(
            &req.id,
            "commit_in_flight",
            "a commit is already in flight for this roster",
            None,
        ),
        // The draft is preserved on any gateway failure; the caller can
        // inspect it via roster.state and retry.
        Err(RosterError::Gateway(e)) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_set_value(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let value = match get_required_str(&req.params, "value") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(gateway) = state.gateway.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.roster.session_mut() else {
        return err(&req.id, "no_roster", "open a roster first", None);
    };
    let command = RosterCommand::SetValue {
        student_id: student_id.clone(),
        value,
    };
    if let Err(e) = session.apply(command, gateway as &mut dyn RemoteGateway) {
        return err(&req.id, "set_value_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({
            "dirty": session.is_dirty(),
            "dirtyCount": session.dirty_count(),
            "value": session.current_value(&student_id),
            "baselineValue": session.baseline_value(&student_id),
        }),
    )
}

fn handle_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.roster.session() {
        Some(session) => ok(&req.id, session_json(session)),
        None => err(
            &req.id,
            "no_roster",
            "open a roster first",
            // A selection without a session means a load failed or is
            // still outstanding.
            state
                .roster
                .selected()
                .map(|scope| json!({ "selected": scope.to_json() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.open" => Some(handle_open(state, req)),
        "roster.setValue" => Some(handle_set_value(state, req)),
        "roster.reset" => Some(handle_command(state, req, RosterCommand::Reset)),
        "roster.commit" => Some(handle_command(state, req, RosterCommand::Commit)),
        "roster.state" => Some(handle_state(state, req)),
        _ => None,
    }
}
