//! Leaderboards derived from the overall aggregate table.

use {
    std::cmp::Ordering,
    crate::{
        prelude::*,
        stats::{
            self,
            Metrics,
            Totals,
        },
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence)]
pub(crate) enum RankingCriterion {
    WinRate,
    Kda,
    Games,
    GoldPerMinute,
    DamagePerMinute,
    KillParticipation,
}

/// How a criterion is named, labelled and measured.
pub(crate) struct CriterionInfo {
    /// Stable identifier used in navigation tokens.
    pub(crate) name: &'static str,
    pub(crate) label: &'static str,
    pub(crate) metric: fn(&Metrics) -> f64,
    pub(crate) format: fn(&Metrics) -> String,
}

static CRITERIA: [CriterionInfo; 6] = [
    CriterionInfo { name: "WIN_RATE", label: "Win rate", metric: |m| m.win_rate, format: |m| format!("{:.1}%", m.win_rate * 100.0) },
    CriterionInfo { name: "KDA", label: "KDA", metric: |m| m.kda, format: |m| format!("{:.2}", m.kda) },
    CriterionInfo { name: "GAMES", label: "Games", metric: |m| m.games as f64, format: |m| m.games.to_string() },
    CriterionInfo { name: "GOLD_PER_MINUTE", label: "Gold/min", metric: |m| m.gold_per_minute, format: |m| format!("{:.0}", m.gold_per_minute) },
    CriterionInfo { name: "DAMAGE_PER_MINUTE", label: "Damage/min", metric: |m| m.damage_per_minute, format: |m| format!("{:.0}", m.damage_per_minute) },
    CriterionInfo { name: "KILL_PARTICIPATION", label: "Kill participation", metric: |m| m.kill_participation, format: |m| format!("{:.1}%", m.kill_participation * 100.0) },
];

/// Applied after the primary criterion, always in this order.
const TIE_BREAKS: [RankingCriterion; 6] = [
    RankingCriterion::WinRate,
    RankingCriterion::Kda,
    RankingCriterion::GoldPerMinute,
    RankingCriterion::KillParticipation,
    RankingCriterion::DamagePerMinute,
    RankingCriterion::Games,
];

impl RankingCriterion {
    pub(crate) fn info(&self) -> &'static CriterionInfo {
        &CRITERIA[*self as usize]
    }

    pub(crate) fn name(&self) -> &'static str { self.info().name }
    pub(crate) fn label(&self) -> &'static str { self.info().label }

    pub(crate) fn value(&self, metrics: &Metrics) -> f64 {
        (self.info().metric)(metrics)
    }

    pub(crate) fn format(&self, metrics: &Metrics) -> String {
        (self.info().format)(metrics)
    }
}

impl fmt::Display for RankingCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RankingCriterion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        all::<Self>().find(|criterion| criterion.name() == s).ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RankedEntity {
    pub(crate) user: UserId,
    pub(crate) totals: Totals,
    pub(crate) metrics: Metrics,
}

/// Descending by `criterion`, then by the fixed tie-break chain.
fn compare(criterion: RankingCriterion, a: &Metrics, b: &Metrics) -> Ordering {
    std::iter::once(criterion)
        .chain(TIE_BREAKS)
        .map(|criterion| criterion.value(b).total_cmp(&criterion.value(a)))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Filters out entities below the threshold and sorts the rest.
pub(crate) fn rank(rows: Vec<(UserId, Totals)>, min_games: i64, criterion: RankingCriterion) -> Vec<RankedEntity> {
    let mut ranked = rows.into_iter()
        .filter(|(_, totals)| totals.total_games >= min_games)
        .map(|(user, totals)| RankedEntity { user, metrics: totals.metrics(), totals })
        .collect_vec();
    ranked.sort_by(|a, b| compare(criterion, &a.metrics, &b.metrics).then_with(|| a.user.cmp(&b.user)));
    ranked
}

/// Reads the overall aggregates of a scope and ranks them.
pub(crate) async fn get_ranking(pool: &SqlitePool, scope: GuildId, min_games: i64, criterion: RankingCriterion) -> sqlx::Result<Vec<RankedEntity>> {
    let rows = stats::overall_for_scope(pool, scope).await?
        .into_iter()
        .map(|row| (row.user_id.0, row.totals))
        .collect();
    Ok(rank(rows, min_games, criterion))
}

/// One page of a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Page<'a, T> {
    /// 1-based.
    pub(crate) number: usize,
    pub(crate) total_pages: usize,
    /// Index of the first item of this page within the full list.
    pub(crate) offset: usize,
    pub(crate) items: &'a [T],
}

impl<'a, T> Page<'a, T> {
    /// Slices out page `number` (1-based). Pages past the end are empty rather than an error.
    pub(crate) fn of(items: &'a [T], number: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = items.len().div_ceil(page_size);
        let offset = number.saturating_sub(1).saturating_mul(page_size).min(items.len());
        let end = offset.saturating_add(page_size).min(items.len());
        Self { number, total_pages, offset, items: &items[offset..end] }
    }

    pub(crate) fn has_prev(&self) -> bool { self.number > 1 }
    pub(crate) fn has_next(&self) -> bool { self.number < self.total_pages }
}
