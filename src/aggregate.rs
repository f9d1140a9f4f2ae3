// Turns a station's raw readings into the line-chart series and the
// day-of-week x time-of-day heatmap.
//
// The readings arrive at irregular intervals, so the heatmap is built in
// three steps:
//  1. resample onto a fixed 15 minute grid covering the readings, filling
//     each slot with the most recent reading at or before it,
//  2. label every slot with its local weekday and HH:MM,
//  3. average the bike totals per (weekday, HH:MM) into a dense 7x96 grid.
extern crate chrono;
extern crate chrono_tz;

use chrono::Datelike;
use chrono::Timelike;

use crate::store;

// Readings at the start of a station's history are noisy.
pub const WARMUP_READINGS: usize = 10;

pub const SLOT_MINUTES: i64 = 15;
pub const SLOTS_PER_DAY: usize = 24 * 60 / SLOT_MINUTES as usize;
pub const DAYS_PER_WEEK: usize = 7;

const WEEKDAYS: [chrono::Weekday; DAYS_PER_WEEK] = [
    chrono::Weekday::Mon,
    chrono::Weekday::Tue,
    chrono::Weekday::Wed,
    chrono::Weekday::Thu,
    chrono::Weekday::Fri,
    chrono::Weekday::Sat,
    chrono::Weekday::Sun,
];

pub type TimePoint = (chrono::DateTime<chrono::Utc>, u32);

// Slot start -> forward-filled total. `None` means no reading had arrived yet.
pub type RegularizedSeries = std::collections::BTreeMap<chrono::DateTime<chrono::Utc>, Option<u32>>;

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapGrid {
    // Always DAYS_PER_WEEK rows (Monday first) of SLOTS_PER_DAY columns.
    cells: Vec<Vec<f64>>,
}

impl HeatmapGrid {
    pub fn zeroed() -> HeatmapGrid {
        return HeatmapGrid{
            cells: vec![vec![0.0; SLOTS_PER_DAY]; DAYS_PER_WEEK],
        };
    }

    #[cfg(test)]
    pub fn get(&self, day: chrono::Weekday, slot: usize) -> f64 {
        return self.cells[day.num_days_from_monday() as usize][slot];
    }

    pub fn rows(&self) -> &Vec<Vec<f64>> {
        return &self.cells;
    }

    pub fn day_labels(&self) -> Vec<String> {
        return WEEKDAYS.iter().map(|d| day_name(*d).to_string()).collect();
    }

    pub fn time_labels(&self) -> Vec<String> {
        return (0..SLOTS_PER_DAY).map(slot_label).collect();
    }

    // Colour scale upper bound.
    pub fn max_value(&self) -> f64 {
        return self.cells.iter()
            .flat_map(|row| row.iter())
            .filter(|v| v.is_finite())
            .fold(0.0, |acc, v| if *v > acc { *v } else { acc });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Occupancy {
    pub e_bikes: Vec<TimePoint>,
    pub standard_bikes: Vec<TimePoint>,
    pub heatmap: HeatmapGrid,
}

// Drops the first WARMUP_READINGS readings; shorter histories become empty.
pub fn trim_warmup(history: Vec<store::Reading>) -> Vec<store::Reading> {
    return history.into_iter().skip(WARMUP_READINGS).collect();
}

pub fn aggregate(readings: &[store::Reading], tz: chrono_tz::Tz) -> Occupancy {
    let series = resample(readings);

    return Occupancy{
        e_bikes: readings.iter().map(|r| (r.timestamp, r.e_bikes)).collect(),
        standard_bikes: readings.iter().map(|r| (r.timestamp, r.standard_bikes)).collect(),
        heatmap: build_heatmap(&series, tz),
    };
}

pub fn resample(readings: &[store::Reading]) -> RegularizedSeries {
    let mut result = RegularizedSeries::new();

    // Later readings with the same timestamp replace earlier ones.
    let totals: std::collections::BTreeMap<chrono::DateTime<chrono::Utc>, u32> = readings.iter()
        .map(|r| (r.timestamp, r.total_bikes()))
        .collect();

    let (first, last) = match (totals.keys().next(), totals.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return result,
    };

    let step = chrono::Duration::minutes(SLOT_MINUTES);
    let mut slot = floor_to_slot(first);
    let end = ceil_to_slot(last);

    while slot <= end {
        let value = totals.range(..=slot).next_back().map(|(_, total)| *total);
        result.insert(slot, value);
        slot = slot + step;
    }

    return result;
}

pub fn build_heatmap(series: &RegularizedSeries, tz: chrono_tz::Tz) -> HeatmapGrid {
    // (weekday, slot) -> (sum, count)
    let mut groups: std::collections::BTreeMap<(usize, usize), (u64, u64)> =
        std::collections::BTreeMap::new();

    for (slot_start, value) in series {
        let total = match value {
            Some(total) => *total,
            None => continue,
        };

        let local = slot_start.with_timezone(&tz);
        let day = local.weekday().num_days_from_monday() as usize;
        let slot = slot_of_day(local.hour(), local.minute());

        let entry = groups.entry((day, slot)).or_insert((0, 0));
        entry.0 += total as u64;
        entry.1 += 1;
    }

    let mut grid = HeatmapGrid::zeroed();
    for ((day, slot), (sum, count)) in groups {
        grid.cells[day][slot] = sum as f64 / count as f64;
    }

    return grid;
}

fn floor_to_slot(ts: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    let slot_seconds = SLOT_MINUTES * 60;
    let floored = ts.timestamp().div_euclid(slot_seconds) * slot_seconds;
    return chrono::DateTime::<chrono::Utc>::from_timestamp(floored, 0).unwrap_or(ts);
}

fn ceil_to_slot(ts: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    let floored = floor_to_slot(ts);
    if floored == ts {
        return floored;
    }
    return floored + chrono::Duration::minutes(SLOT_MINUTES);
}

fn slot_of_day(hour: u32, minute: u32) -> usize {
    return (hour as usize * 60 + minute as usize) / SLOT_MINUTES as usize;
}

pub fn slot_label(slot: usize) -> String {
    let minutes = slot * SLOT_MINUTES as usize;
    return format!("{:02}:{:02}", minutes / 60, minutes % 60);
}

pub fn day_name(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}
