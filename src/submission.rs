//! Match data as submitted by players, before it is written to the ledger.

use crate::prelude::*;

/// Number of player slots in a match.
pub(crate) const MATCH_SIZE: usize = 10;
/// Slots before this index play for [`TeamLabel::TeamA`].
pub(crate) const TEAM_SIZE: usize = MATCH_SIZE / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Deserialize, sqlx::Type)]
#[serde(try_from = "String")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum TeamLabel {
    TeamA,
    TeamB,
}

impl TeamLabel {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::TeamA => "TEAM_A",
            Self::TeamB => "TEAM_B",
        }
    }

    /// The team a wizard slot plays for. The first half of the slots are always team A.
    pub(crate) fn for_slot(slot: usize) -> Self {
        if slot < TEAM_SIZE { Self::TeamA } else { Self::TeamB }
    }
}

impl fmt::Display for TeamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TeamA => write!(f, "Team A"),
            Self::TeamB => write!(f, "Team B"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown team label: {0:?}")]
pub(crate) struct UnknownTeamLabel(pub(crate) String);

impl FromStr for TeamLabel {
    type Err = UnknownTeamLabel;

    /// Case-insensitive, so `team_a` and `TEAM_A` name the same team.
    fn from_str(s: &str) -> Result<Self, UnknownTeamLabel> {
        let s = s.trim();
        all::<Self>().find(|team| team.as_str().eq_ignore_ascii_case(s)).ok_or_else(|| UnknownTeamLabel(s.to_owned()))
    }
}

impl TryFrom<String> for TeamLabel {
    type Error = UnknownTeamLabel;

    fn try_from(s: String) -> Result<Self, UnknownTeamLabel> {
        s.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerEntry {
    pub(crate) account_name: String,
    pub(crate) account_tag: String,
    pub(crate) team: TeamLabel,
    pub(crate) kills: u32,
    pub(crate) deaths: u32,
    pub(crate) assists: u32,
    #[serde(default)]
    pub(crate) gold: Option<u32>,
    #[serde(default)]
    pub(crate) damage: Option<u32>,
    #[serde(default)]
    pub(crate) duration_seconds: Option<u32>,
    #[serde(default)]
    pub(crate) champion_name: Option<String>,
    #[serde(default)]
    pub(crate) role_name: Option<String>,
}

impl PlayerEntry {
    /// The `name#tag` form used in messages and validation reports.
    pub(crate) fn riot_id(&self) -> String {
        format!("{}#{}", self.account_name, self.account_tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MatchSubmission {
    pub(crate) scope: GuildId,
    pub(crate) winning_team: TeamLabel,
    pub(crate) entries: Vec<PlayerEntry>,
}

impl MatchSubmission {
    /// Sum of kills per team, used as the denominator of kill participation.
    pub(crate) fn team_kills(&self, team: TeamLabel) -> u64 {
        self.entries.iter().filter(|entry| entry.team == team).map(|entry| u64::from(entry.kills)).sum()
    }

    /// Multi-line overview shown before a submission is confirmed.
    pub(crate) fn summary(&self) -> String {
        let mut summary = format!("Winner: {}\n", self.winning_team);
        for team in all::<TeamLabel>() {
            summary.push_str(&format!("**{team}**\n"));
            for entry in self.entries.iter().filter(|entry| entry.team == team) {
                summary.push_str(&format!("- {} {}/{}/{}", entry.riot_id(), entry.kills, entry.deaths, entry.assists));
                if let Some(champion) = &entry.champion_name {
                    summary.push_str(&format!(" ({champion})"));
                }
                summary.push('\n');
            }
        }
        summary
    }
}
