//! Derived progress numbers: XP, levels, streaks, completion series, heatmap.
//!
//! Everything here is a pure function of the goals and the entry history.
//! Weights are always looked up against the *current* goals, so editing a
//! subtask's weight changes the XP of past checks too.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{CategoryFilter, DailyEntry, Goal, Weight, completion_key};
use crate::utils::format_date;

/// XP needed to go from level 1 to level 2
pub const FIRST_LEVEL_REQUIREMENT: u64 = 200;
/// Each following level needs this much more than the previous one
pub const LEVEL_REQUIREMENT_STEP: u64 = 100;
/// Number of days shown in the activity heatmap
pub const HEATMAP_DAYS: u32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelInfo {
    pub level: u32,
    /// XP accumulated inside the current level
    pub progress: u64,
    /// XP the current level needs before the next one
    pub next_need: u64,
}

/// Sum of XP over every true check in the history.
///
/// Keys that no longer resolve to a subtask are counted at the normal weight.
pub fn compute_total_xp(goals: &[Goal], entries: &[DailyEntry]) -> u64 {
    let weights = weight_index(goals);
    entries
        .iter()
        .flat_map(|e| e.checks.iter())
        .filter(|(_, checked)| **checked)
        .map(|(key, _)| weights.get(key.as_str()).copied().unwrap_or_default().xp())
        .sum()
}

fn weight_index(goals: &[Goal]) -> HashMap<String, Weight> {
    goals
        .iter()
        .flat_map(|g| g.subtasks.iter().map(move |t| (completion_key(&g.id, &t.id), t.weight)))
        .collect()
}

pub fn level_from_xp(xp: u64) -> LevelInfo {
    let mut level = 1;
    let mut need = FIRST_LEVEL_REQUIREMENT;
    let mut rest = xp;
    while rest >= need {
        rest -= need;
        level += 1;
        need += LEVEL_REQUIREMENT_STEP;
    }
    LevelInfo {
        level,
        progress: rest,
        next_need: need,
    }
}

/// Consecutive days, ending today, that have at least one true check.
/// Returns 0 when today itself does not qualify.
pub fn compute_streak(entries: &[DailyEntry], today: NaiveDate) -> u32 {
    let by_date: HashMap<&str, &DailyEntry> =
        entries.iter().map(|e| (e.date.as_str(), e)).collect();

    let mut streak = 0;
    let mut day = today;
    loop {
        let qualifies = by_date
            .get(format_date(day).as_str())
            .is_some_and(|e| e.has_any_check());
        if !qualifies {
            break;
        }
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Completion of one calendar day against the current subtask set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCompletion {
    pub date: NaiveDate,
    pub done: usize,
    pub total: usize,
}

impl DayCompletion {
    /// Fraction in `0.0..=1.0`; zero when there are no subtasks
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.done as f64 / self.total as f64
        }
    }

    /// Whole percent, rounded half up
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.done * 200 + self.total) / (self.total * 2)) as u8
    }
}

/// Chart ranges offered on the stats screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatsRange {
    #[default]
    Week,
    Month,
    Year,
}

impl StatsRange {
    pub fn days(self) -> u32 {
        match self {
            StatsRange::Week => 7,
            StatsRange::Month => 30,
            StatsRange::Year => 365,
        }
    }
}

impl std::str::FromStr for StatsRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "week" | "w" => Ok(StatsRange::Week),
            "month" | "m" => Ok(StatsRange::Month),
            "year" | "y" => Ok(StatsRange::Year),
            other => Err(format!("unknown range '{}', expected week, month or year", other)),
        }
    }
}

/// One point per day for the last `days` days, oldest first, ending today
pub fn completion_series(
    goals: &[Goal],
    entries: &[DailyEntry],
    days: u32,
    today: NaiveDate,
) -> Vec<DayCompletion> {
    let keys: Vec<String> = goals.iter().flat_map(|g| g.completion_keys()).collect();
    let by_date: HashMap<&str, &DailyEntry> =
        entries.iter().map(|e| (e.date.as_str(), e)).collect();

    (0..days)
        .rev()
        .filter_map(|back| today.checked_sub_days(chrono::Days::new(u64::from(back))))
        .map(|date| {
            let done = by_date
                .get(format_date(date).as_str())
                .map(|e| keys.iter().filter(|k| e.is_checked(k)).count())
                .unwrap_or(0);
            DayCompletion {
                date,
                done,
                total: keys.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeatBucket {
    /// nothing done
    Empty,
    /// under 34%
    Low,
    /// 34% up to 67%
    Medium,
    /// 67% and above
    High,
}

impl HeatBucket {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 0.0 {
            HeatBucket::Empty
        } else if ratio < 0.34 {
            HeatBucket::Low
        } else if ratio < 0.67 {
            HeatBucket::Medium
        } else {
            HeatBucket::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatCell {
    pub date: NaiveDate,
    pub ratio: f64,
    pub bucket: HeatBucket,
}

pub fn heatmap(goals: &[Goal], entries: &[DailyEntry], today: NaiveDate) -> Vec<HeatCell> {
    completion_series(goals, entries, HEATMAP_DAYS, today)
        .into_iter()
        .map(|day| {
            let ratio = day.ratio();
            HeatCell {
                date: day.date,
                ratio,
                bucket: HeatBucket::from_ratio(ratio),
            }
        })
        .collect()
}

/// Progress of a single day as shown on the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaySummary {
    pub done: usize,
    pub total: usize,
    pub xp: u64,
}

pub fn day_summary(goals: &[Goal], entry: Option<&DailyEntry>) -> DaySummary {
    let mut summary = DaySummary::default();
    for goal in goals {
        for task in &goal.subtasks {
            summary.total += 1;
            let checked = entry.is_some_and(|e| e.is_checked(&completion_key(&goal.id, &task.id)));
            if checked {
                summary.done += 1;
                summary.xp += task.weight.xp();
            }
        }
    }
    summary
}

pub fn filter_goals(goals: &[Goal], filter: CategoryFilter) -> Vec<&Goal> {
    goals.iter().filter(|g| filter.matches(g.category)).collect()
}
