use crate::schedule::{ScheduleEntry, WeekSchedule, Weekday};

/// Rendering window for the timetable grid. Matches the frontend default of
/// 08:00-18:00 at 100px per hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionWindow {
    pub start_minute: u16,
    pub end_minute: u16,
    pub pixels_per_hour: f64,
}

impl Default for ProjectionWindow {
    fn default() -> Self {
        ProjectionWindow {
            start_minute: 8 * 60,
            end_minute: 18 * 60,
            pixels_per_hour: 100.0,
        }
    }
}

/// One positioned block. `lane`/`lanes` split overlapping same-day entries
/// into adjacent equal-width sub-columns so both stay visible and clickable.
/// Disposable view model, recomputed on every render.
#[derive(Debug, Clone, PartialEq)]
pub struct GridBlock {
    pub entry_id: String,
    pub weekday: Weekday,
    pub top: f64,
    pub height: f64,
    pub lane: usize,
    pub lanes: usize,
    pub clipped: bool,
}

/// Project a week schedule to pixel geometry.
///
/// Entries reaching past the window are clipped to its bounds, never given
/// negative or overflowing geometry; entries entirely outside are dropped.
pub fn project(schedule: &WeekSchedule, window: &ProjectionWindow) -> Vec<GridBlock> {
    let mut blocks = Vec::new();
    for weekday in Weekday::ALL {
        let day = schedule.entries_for(weekday);
        let mut i = 0;
        while i < day.len() {
            // Cluster of transitively overlapping entries; day is ordered by
            // start, so the cluster ends at the first gap.
            let mut end = day[i].slot.end();
            let mut j = i + 1;
            while j < day.len() && day[j].slot.start() < end {
                end = end.max(day[j].slot.end());
                j += 1;
            }
            project_cluster(&day[i..j], window, &mut blocks);
            i = j;
        }
    }
    blocks
}

fn project_cluster(cluster: &[ScheduleEntry], window: &ProjectionWindow, out: &mut Vec<GridBlock>) {
    // Greedy lane assignment: first lane whose last entry has ended.
    let mut lane_ends: Vec<u16> = Vec::new();
    let mut assigned: Vec<(usize, &ScheduleEntry)> = Vec::new();
    for entry in cluster {
        let lane = match lane_ends.iter().position(|&e| e <= entry.slot.start()) {
            Some(l) => l,
            None => {
                lane_ends.push(0);
                lane_ends.len() - 1
            }
        };
        lane_ends[lane] = entry.slot.end();
        assigned.push((lane, entry));
    }
    let lanes = lane_ends.len();

    for (lane, entry) in assigned {
        let visible_start = entry.slot.start().max(window.start_minute);
        let visible_end = entry.slot.end().min(window.end_minute);
        if visible_end <= visible_start {
            continue;
        }
        let per_minute = window.pixels_per_hour / 60.0;
        out.push(GridBlock {
            entry_id: entry.id.clone(),
            weekday: entry.weekday,
            top: f64::from(visible_start - window.start_minute) * per_minute,
            height: f64::from(visible_end - visible_start) * per_minute,
            lane,
            lanes,
            clipped: entry.slot.start() < window.start_minute
                || entry.slot.end() > window.end_minute,
        });
    }
}
