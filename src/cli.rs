use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::metrics::{self, HeatBucket, StatsRange};
use crate::models::{Category, CategoryFilter, Goal, Subtask, Weight};
use crate::scheduler::Clock;
use crate::sync::{MutationError, SyncCoordinator, SyncStatus};
use crate::utils::{format_date, parse_date, today};

#[derive(Parser)]
#[command(name = "goaltrack")]
#[command(about = "Goals, daily check-ins and progress, synced to the cloud")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// XP, level, streak and today's progress (default if no subcommand)
    Summary {
        /// Day to summarize (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// List goals and their subtasks
    Goals {
        /// Ignore the saved category filter
        #[arg(long)]
        all: bool,
    },
    /// Add a new goal
    AddGoal {
        /// Goal title
        title: String,
        /// Category (e.g. work, sales, health)
        #[arg(long, default_value = "work")]
        category: String,
        /// Reminder time (HH:MM)
        #[arg(long)]
        reminder: Option<String>,
    },
    /// Add a subtask to a goal
    AddSubtask {
        /// Goal id or title
        goal: String,
        /// Subtask text
        text: String,
        /// Mark as hard (worth double XP)
        #[arg(long)]
        hard: bool,
    },
    /// Delete a goal and its subtasks
    RemoveGoal {
        /// Goal id or title
        goal: String,
    },
    /// Toggle a subtask's completion for a day
    Check {
        /// Goal id or title
        goal: String,
        /// Subtask id or text
        subtask: String,
        /// Day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Set the notes for a day
    Note {
        /// Note text
        text: String,
        /// Day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Set the goal list category filter ("all" to clear)
    Filter {
        category: String,
    },
    /// Completion percentage per day
    Stats {
        /// week, month or year
        #[arg(long, default_value = "week")]
        range: String,
    },
    /// Activity heatmap for the last 70 days
    Heatmap,
    /// Synchronize with the remote store and report status
    Sync,
    /// Erase all data and start over with the sample goals
    Reset {
        /// Skip the safety check
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    MutationError(#[from] MutationError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

fn resolve_date(date: Option<String>) -> Result<NaiveDate, CliError> {
    match date {
        Some(s) => parse_date(&s)
            .map_err(|e| CliError::DateParseError(format!("Invalid date format '{}': {}", s, e))),
        None => Ok(today()),
    }
}

fn resolve_goal<C: Clock>(coord: &SyncCoordinator<C>, needle: &str) -> Result<String, CliError> {
    coord
        .state()
        .find_goal_id(needle)
        .ok_or_else(|| MutationError::GoalNotFound(needle.to_string()).into())
}

/// Print the sync status line
pub fn print_status<C: Clock>(coord: &SyncCoordinator<C>) {
    if !coord.has_remote() {
        println!("sync: local only");
        return;
    }
    match (coord.status(), coord.last_error()) {
        (SyncStatus::Error, Some(message)) => println!("sync: error ({})", message),
        (status, _) => println!("sync: {}", status),
    }
}

/// Handle the summary command
pub fn handle_summary<C: Clock>(coord: &SyncCoordinator<C>, date: Option<String>) -> Result<(), CliError> {
    let day = resolve_date(date)?;
    let state = coord.state();

    let xp = metrics::compute_total_xp(&state.goals, &state.entries);
    let level = metrics::level_from_xp(xp);
    let streak = metrics::compute_streak(&state.entries, today());
    let summary = metrics::day_summary(&state.goals, state.entry(&format_date(day)));

    println!("Level {} ({}/{} XP), {} XP total", level.level, level.progress, level.next_need, xp);
    println!("Streak: {} day(s)", streak);
    println!(
        "{}: {}/{} done, +{} XP",
        format_date(day),
        summary.done,
        summary.total,
        summary.xp
    );
    Ok(())
}

/// Handle the goals command
pub fn handle_goals<C: Clock>(coord: &SyncCoordinator<C>, all: bool) -> Result<(), CliError> {
    let state = coord.state();
    let filter = if all { CategoryFilter::All } else { state.admin_category_filter };
    let entry = state.entry(&format_date(today()));

    for goal in metrics::filter_goals(&state.goals, filter) {
        let reminder = goal.reminder_time.as_deref().unwrap_or("-");
        println!("{} [{}] reminder {} ({})", goal.title, goal.category, reminder, goal.id);
        for task in &goal.subtasks {
            let key = crate::models::completion_key(&goal.id, &task.id);
            let mark = if entry.is_some_and(|e| e.is_checked(&key)) { "x" } else { " " };
            let hard = if task.weight == Weight::Hard { " (hard)" } else { "" };
            println!("  [{}] {}{} ({})", mark, task.text, hard, task.id);
        }
    }
    Ok(())
}

/// Handle the add-goal command
pub fn handle_add_goal<C: Clock>(
    coord: &mut SyncCoordinator<C>,
    title: String,
    category: String,
    reminder: Option<String>,
) -> Result<(), CliError> {
    let category = Category::parse(&category)
        .ok_or_else(|| CliError::InvalidArgument(format!("unknown category '{}'", category)))?;
    if let Some(time) = &reminder {
        chrono::NaiveTime::parse_from_str(time, "%H:%M")
            .map_err(|e| CliError::InvalidArgument(format!("reminder '{}': {}", time, e)))?;
    }

    let mut goal = Goal::new(title, category);
    goal.reminder_time = reminder;
    let id = goal.id.clone();
    coord.upsert_goal(goal)?;
    println!("Goal created successfully (ID: {})", id);
    Ok(())
}

/// Handle the add-subtask command
pub fn handle_add_subtask<C: Clock>(
    coord: &mut SyncCoordinator<C>,
    goal: String,
    text: String,
    hard: bool,
) -> Result<(), CliError> {
    let goal_id = resolve_goal(coord, &goal)?;
    let weight = if hard { Weight::Hard } else { Weight::Normal };
    let task = Subtask::new(text, weight);
    let id = task.id.clone();
    coord.add_subtask(&goal_id, task)?;
    println!("Subtask created successfully (ID: {})", id);
    Ok(())
}

/// Handle the remove-goal command
pub fn handle_remove_goal<C: Clock>(coord: &mut SyncCoordinator<C>, goal: String) -> Result<(), CliError> {
    let goal_id = resolve_goal(coord, &goal)?;
    let removed = coord.remove_goal(&goal_id)?;
    println!("Goal '{}' deleted", removed.title);
    Ok(())
}

/// Handle the check command
pub fn handle_check<C: Clock>(
    coord: &mut SyncCoordinator<C>,
    goal: String,
    subtask: String,
    date: Option<String>,
) -> Result<(), CliError> {
    let day = resolve_date(date)?;
    let goal_id = resolve_goal(coord, &goal)?;
    let subtask_id = coord
        .state()
        .goal(&goal_id)
        .and_then(|g| {
            g.subtasks
                .iter()
                .find(|t| t.id == subtask || t.text.eq_ignore_ascii_case(&subtask))
        })
        .map(|t| t.id.clone())
        .ok_or_else(|| MutationError::SubtaskNotFound(subtask.clone()))?;

    let done = coord.toggle_check(day, &goal_id, &subtask_id)?;
    println!("{} on {}", if done { "Checked" } else { "Unchecked" }, format_date(day));
    Ok(())
}

/// Handle the note command
pub fn handle_note<C: Clock>(
    coord: &mut SyncCoordinator<C>,
    text: String,
    date: Option<String>,
) -> Result<(), CliError> {
    let day = resolve_date(date)?;
    coord.set_notes(day, text)?;
    println!("Notes saved for {}", format_date(day));
    Ok(())
}

/// Handle the filter command
pub fn handle_filter<C: Clock>(coord: &mut SyncCoordinator<C>, category: String) -> Result<(), CliError> {
    let filter = CategoryFilter::try_from(category).map_err(CliError::InvalidArgument)?;
    coord.set_category_filter(filter)?;
    Ok(())
}

/// Handle the stats command
pub fn handle_stats<C: Clock>(coord: &SyncCoordinator<C>, range: String) -> Result<(), CliError> {
    let range: StatsRange = range.parse().map_err(CliError::InvalidArgument)?;
    let state = coord.state();
    let series = metrics::completion_series(&state.goals, &state.entries, range.days(), today());

    for day in &series {
        let bar = "#".repeat(usize::from(day.percent()) / 5);
        println!("{} {:>3}% {}", day.date.format("%m-%d"), day.percent(), bar);
    }
    Ok(())
}

/// Handle the heatmap command
pub fn handle_heatmap<C: Clock>(coord: &SyncCoordinator<C>) -> Result<(), CliError> {
    let state = coord.state();
    let cells = metrics::heatmap(&state.goals, &state.entries, today());

    for week in cells.chunks(7) {
        let row: String = week
            .iter()
            .map(|c| match c.bucket {
                HeatBucket::Empty => '·',
                HeatBucket::Low => '░',
                HeatBucket::Medium => '▒',
                HeatBucket::High => '█',
            })
            .collect();
        if let Some(first) = week.first() {
            println!("{} {}", format_date(first.date), row);
        }
    }
    Ok(())
}

/// Handle the reset command
pub fn handle_reset<C: Clock>(coord: &mut SyncCoordinator<C>, yes: bool) -> Result<(), CliError> {
    if !yes {
        return Err(CliError::InvalidArgument(
            "reset erases all goals and history; pass --yes to confirm".to_string(),
        ));
    }
    coord.reset();
    println!("All data reset");
    Ok(())
}
