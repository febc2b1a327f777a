use serde_json::json;

use crate::gateway::{RemoteGateway, ScheduleEntryDraft, ScheduleFilter};
use crate::grid::{self, ProjectionWindow};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, get_time, get_weekday, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{
    format_minutes, DayWindow, ScheduleEntry, TimeSlot, WeekSchedule,
};

fn filter_from_params(params: &serde_json::Value) -> Result<ScheduleFilter, HandlerErr> {
    Ok(ScheduleFilter {
        class_id: get_opt_str(params, "classId")?,
        teacher_id: get_opt_str(params, "teacherId")?,
    })
}

fn entry_json(e: &ScheduleEntry) -> serde_json::Value {
    json!({
        "id": e.id,
        "dayOfWeek": e.weekday.as_str(),
        "startTime": format_minutes(e.slot.start()),
        "endTime": format_minutes(e.slot.end()),
        "durationMinutes": e.slot.duration_minutes(),
        "subjectId": e.subject_id,
        "teacherId": e.teacher_id,
        "roomId": e.room_id,
        "classId": e.class_id,
    })
}

fn build_week(
    gateway: &dyn RemoteGateway,
    filter: &ScheduleFilter,
) -> Result<WeekSchedule, HandlerErr> {
    let mut week = WeekSchedule::new();
    for entry in gateway.list_schedule_entries(filter)? {
        // Conflicts among loaded entries are reported separately; insertion
        // itself never blocks.
        let _ = week.insert(entry);
    }
    Ok(week)
}

fn week_open(
    gateway: &dyn RemoteGateway,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let filter = filter_from_params(params)?;
    let week = build_week(gateway, &filter)?;
    let entries: Vec<serde_json::Value> = week.all().into_iter().map(entry_json).collect();
    let conflicts: Vec<serde_json::Value> = week
        .conflict_pairs()
        .into_iter()
        .map(|(a, b)| json!({ "entryId": a, "withEntryId": b }))
        .collect();
    Ok(json!({ "entries": entries, "conflicts": conflicts, "total": week.len() }))
}

fn create_entry(
    gateway: &mut dyn RemoteGateway,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let weekday = get_weekday(params, "dayOfWeek")?;
    let start = get_time(params, "startTime")?;
    let end = get_time(params, "endTime")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let teacher_id = get_required_str(params, "teacherId")?;
    let class_id = get_required_str(params, "classId")?;
    let room_id = get_opt_str(params, "roomId")?;
    let allow_conflicts = params
        .get("allowConflicts")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // Local validation happens before anything is sent out.
    let slot = TimeSlot::create(start, end, &DayWindow::default())?;
    let probe = ScheduleEntry::create(
        "pending",
        weekday,
        slot,
        subject_id.clone(),
        teacher_id.clone(),
        room_id.clone(),
        class_id.clone(),
    )?;

    // Advisory check over the whole week (all classes: teacher and room
    // clashes cross class boundaries). The caller may confirm and proceed;
    // the backend stays the authority for actual rejection.
    let mut week = build_week(gateway, &ScheduleFilter::default())?;
    let advisory = week.insert(probe);
    let _ = week.remove("pending");
    if !advisory.is_empty() && !allow_conflicts {
        return Err(HandlerErr {
            code: "conflict",
            message: "entry overlaps existing entries; set allowConflicts to proceed".to_string(),
            details: Some(json!({ "entryIds": advisory, "advisory": true })),
        });
    }

    let created = gateway.create_schedule_entry(&ScheduleEntryDraft {
        weekday,
        slot,
        subject_id,
        teacher_id,
        room_id,
        class_id,
    })?;
    Ok(json!({ "entry": entry_json(&created), "conflictIds": advisory }))
}

fn delete_entry(
    gateway: &mut dyn RemoteGateway,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    gateway.delete_schedule_entry(&id)?;
    Ok(json!({ "deleted": id }))
}

fn window_from_params(params: &serde_json::Value) -> Result<ProjectionWindow, HandlerErr> {
    let defaults = ProjectionWindow::default();
    let Some(w) = params.get("window") else {
        return Ok(defaults);
    };
    let get_minute = |key: &str, fallback: u16| -> Result<u16, HandlerErr> {
        match w.get(key) {
            None => Ok(fallback),
            Some(v) => v
                .as_u64()
                .filter(|&m| m < 1440)
                .map(|m| m as u16)
                .ok_or_else(|| HandlerErr::bad_params(format!("window.{} out of range", key))),
        }
    };
    let start_minute = get_minute("startMinute", defaults.start_minute)?;
    let end_minute = get_minute("endMinute", defaults.end_minute)?;
    if end_minute <= start_minute {
        return Err(HandlerErr::bad_params("window must end after it starts"));
    }
    let pixels_per_hour = match w.get("pixelsPerHour") {
        None => defaults.pixels_per_hour,
        Some(v) => v
            .as_f64()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| HandlerErr::bad_params("window.pixelsPerHour must be positive"))?,
    };
    Ok(ProjectionWindow {
        start_minute,
        end_minute,
        pixels_per_hour,
    })
}

fn project(
    gateway: &dyn RemoteGateway,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let filter = filter_from_params(params)?;
    let window = window_from_params(params)?;
    let week = build_week(gateway, &filter)?;
    if week.is_empty() {
        return Ok(json!({ "blocks": [] }));
    }
    let blocks: Vec<serde_json::Value> = grid::project(&week, &window)
        .into_iter()
        .map(|b| {
            json!({
                "entryId": b.entry_id,
                "dayOfWeek": b.weekday.as_str(),
                "top": b.top,
                "height": b.height,
                "lane": b.lane,
                "lanes": b.lanes,
                "clipped": b.clipped,
            })
        })
        .collect();
    Ok(json!({ "blocks": blocks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "timetable.weekOpen" | "timetable.project" => {
            let Some(gateway) = state.gateway.as_ref() else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            match req.method.as_str() {
                "timetable.weekOpen" => week_open(gateway, &req.params),
                _ => project(gateway, &req.params),
            }
        }
        "timetable.createEntry" | "timetable.deleteEntry" => {
            let Some(gateway) = state.gateway.as_mut() else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            match req.method.as_str() {
                "timetable.createEntry" => create_entry(gateway, &req.params),
                _ => delete_entry(gateway, &req.params),
            }
        }
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
