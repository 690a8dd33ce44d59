use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::MigrateError;

/// One independently invokable migration step, listed in the order they should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    DataSources,
    CheckDataSources,
    Users,
    Groups,
    Destinations,
    Queries,
    FixQrdsRefs,
    FixCsvQueries,
    Visualizations,
    Dashboards,
    Alerts,
    Favorites,
    DisableUsers,
}

impl Phase {
    pub const ALL: [Phase; 13] = [
        Phase::DataSources,
        Phase::CheckDataSources,
        Phase::Users,
        Phase::Groups,
        Phase::Destinations,
        Phase::Queries,
        Phase::FixQrdsRefs,
        Phase::FixCsvQueries,
        Phase::Visualizations,
        Phase::Dashboards,
        Phase::Alerts,
        Phase::Favorites,
        Phase::DisableUsers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DataSources => "data-sources",
            Self::CheckDataSources => "check-data-sources",
            Self::Users => "users",
            Self::Groups => "groups",
            Self::Destinations => "destinations",
            Self::Queries => "queries",
            Self::FixQrdsRefs => "fix-qrds-refs",
            Self::FixCsvQueries => "fix-csv-queries",
            Self::Visualizations => "visualizations",
            Self::Dashboards => "dashboards",
            Self::Alerts => "alerts",
            Self::Favorites => "favorites",
            Self::DisableUsers => "disable-users",
        }
    }

    pub fn about(self) -> &'static str {
        match self {
            Self::DataSources => "create stub data sources at the destination",
            Self::CheckDataSources => "compare the data source map against both instances",
            Self::Users => "migrate enabled and disabled users without sending invitations",
            Self::Groups => "migrate groups, their members and data source permissions",
            Self::Destinations => "migrate alert destinations",
            Self::Queries => "migrate queries, resolving query-based dropdown parameters",
            Self::FixQrdsRefs => "rewrite query_<id> references in query-results queries",
            Self::FixCsvQueries => "rewrite legacy URL queries for the CSV data source",
            Self::Visualizations => "migrate visualizations of migrated queries",
            Self::Dashboards => "migrate dashboards; skips widgets with missing visualizations",
            Self::Alerts => "migrate alerts and their subscriptions",
            Self::Favorites => "migrate each user's favorite queries and dashboards",
            Self::DisableUsers => "disable destination users that are disabled at origin",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.name() == s)
            .ok_or_else(|| MigrateError::UnknownPhase(s.to_string()))
    }
}

/// Help text listing every phase in order.
pub fn phase_help() -> String {
    let mut help = String::from("Phases (run them in this order):\n");
    for phase in Phase::ALL {
        help.push_str(&format!("  {:<20} {}\n", phase.name(), phase.about()));
    }
    help
}
