use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
}

/// What happened to one entity during a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Skip,
    Warning,
    Fail,
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Skip => write!(f, "SKIP"),
            Self::Warning => write!(f, "WARNING"),
            Self::Fail => write!(f, "FAIL"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    DataSource,
    Destination,
    Group,
    User,
    Query,
    Visualization,
    Dashboard,
    Widget,
    Alert,
    Subscription,
    Favorite,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataSource => write!(f, "Data source"),
            Self::Destination => write!(f, "Destination"),
            Self::Group => write!(f, "Group"),
            Self::User => write!(f, "User"),
            Self::Query => write!(f, "Query"),
            Self::Visualization => write!(f, "Viz"),
            Self::Dashboard => write!(f, "Dashboard"),
            Self::Widget => write!(f, "Widget"),
            Self::Alert => write!(f, "Alert"),
            Self::Subscription => write!(f, "Subscription"),
            Self::Favorite => write!(f, "Favorite"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub ok: usize,
    pub skip: usize,
    pub warning: usize,
    pub fail: usize,
    pub error: usize,
}

impl Tally {
    fn bump(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Ok => self.ok += 1,
            Outcome::Skip => self.skip += 1,
            Outcome::Warning => self.warning += 1,
            Outcome::Fail => self.fail += 1,
            Outcome::Error => self.error += 1,
        }
    }

    fn get(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Ok => self.ok,
            Outcome::Skip => self.skip,
            Outcome::Warning => self.warning,
            Outcome::Fail => self.fail,
            Outcome::Error => self.error,
        }
    }
}

/// Per-entity status lines and their running counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    counts: BTreeMap<Entity, Tally>,
}

impl Report {
    /// Log `"<Kind> <id> - <OUTCOME> - <message>"` and count it.
    pub fn record(
        &mut self,
        entity: Entity,
        id: impl fmt::Display,
        outcome: Outcome,
        message: impl AsRef<str>,
    ) {
        let line = format!("{entity} {id} - {outcome} - {}", message.as_ref());
        match outcome {
            Outcome::Ok | Outcome::Skip => info!("{line}"),
            Outcome::Warning => warn!("{line}"),
            Outcome::Fail | Outcome::Error => error!("{line}"),
        }
        self.counts.entry(entity).or_default().bump(outcome);
    }

    pub fn count(&self, entity: Entity, outcome: Outcome) -> usize {
        self.counts
            .get(&entity)
            .map(|tally| tally.get(outcome))
            .unwrap_or(0)
    }

    pub fn total(&self, outcome: Outcome) -> usize {
        self.counts.values().map(|tally| tally.get(outcome)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Result of running one phase to the end or to an abort.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub report: Report,
}

pub fn print_outcome(outcome: &PhaseOutcome, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(outcome)?),
        Format::Pretty => {
            let status = if outcome.completed {
                "completed".green().bold()
            } else {
                "aborted".red().bold()
            };
            println!("\n{} {}", outcome.phase.to_string().bold(), status);
            if let Some(ref err) = outcome.error {
                println!("  {} {}", "error:".dimmed(), err.red());
            }
            if outcome.report.is_empty() {
                println!("  {}", "nothing to do".dimmed());
            }
            for (entity, tally) in &outcome.report.counts {
                println!(
                    "  {:<14} {} ok, {} skipped, {} warnings, {} failed, {} errors",
                    format!("{entity}:").dimmed(),
                    tally.ok,
                    tally.skip,
                    tally.warning,
                    tally.fail,
                    tally.error
                );
            }
        }
    }
    Ok(())
}
