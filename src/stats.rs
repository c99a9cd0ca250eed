//! Cumulative per-user counters, kept overall, per champion and per role.

use crate::prelude::*;

/// Which of the three aggregate tables a row belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Breakdown {
    Overall,
    Champion(String),
    Role(String),
}

impl Breakdown {
    fn table(&self) -> &'static str {
        match self {
            Self::Overall => "overall_stats",
            Self::Champion(_) => "champion_stats",
            Self::Role(_) => "role_stats",
        }
    }

    fn key_column(&self) -> Option<&'static str> {
        match self {
            Self::Overall => None,
            Self::Champion(_) => Some("champion"),
            Self::Role(_) => Some("role"),
        }
    }

    fn key(&self) -> Option<&str> {
        match self {
            Self::Overall => None,
            Self::Champion(key) | Self::Role(key) => Some(key),
        }
    }
}

/// The contribution of one player in one match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StatDelta {
    pub(crate) win: bool,
    pub(crate) kills: i64,
    pub(crate) deaths: i64,
    pub(crate) assists: i64,
    pub(crate) gold: i64,
    pub(crate) damage: i64,
    pub(crate) team_kills: i64,
    pub(crate) duration_seconds: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct Totals {
    pub(crate) total_games: i64,
    pub(crate) total_wins: i64,
    pub(crate) total_kills: i64,
    pub(crate) total_deaths: i64,
    pub(crate) total_assists: i64,
    pub(crate) total_gold: i64,
    pub(crate) total_damage: i64,
    pub(crate) total_team_kills: i64,
    pub(crate) total_duration_seconds: i64,
}

/// Derived metrics shared by rankings and profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Metrics {
    pub(crate) games: i64,
    pub(crate) win_rate: f64,
    pub(crate) kda: f64,
    pub(crate) gold_per_minute: f64,
    pub(crate) damage_per_minute: f64,
    pub(crate) kill_participation: f64,
}

/// `(kills + assists) / max(deaths, 1)`, so a deathless game counts as if the player died once.
pub(crate) fn kda(kills: i64, deaths: i64, assists: i64) -> f64 {
    (kills + assists) as f64 / deaths.max(1) as f64
}

fn per_minute(value: i64, duration_seconds: i64) -> f64 {
    if duration_seconds <= 0 { return 0.0 }
    value as f64 / (duration_seconds as f64 / 60.0)
}

impl Totals {
    pub(crate) fn metrics(&self) -> Metrics {
        Metrics {
            games: self.total_games,
            win_rate: if self.total_games == 0 { 0.0 } else { self.total_wins as f64 / self.total_games as f64 },
            kda: kda(self.total_kills, self.total_deaths, self.total_assists),
            gold_per_minute: per_minute(self.total_gold, self.total_duration_seconds),
            damage_per_minute: per_minute(self.total_damage, self.total_duration_seconds),
            kill_participation: (self.total_kills + self.total_assists) as f64 / self.total_team_kills.max(1) as f64,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct UserTotals {
    pub(crate) user_id: Snowflake<UserId>,
    #[sqlx(flatten)]
    pub(crate) totals: Totals,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct KeyedTotals {
    pub(crate) key: String,
    #[sqlx(flatten)]
    pub(crate) totals: Totals,
}

const TOTAL_COLUMNS: &str = "total_games, total_wins, total_kills, total_deaths, total_assists, total_gold, total_damage, total_team_kills, total_duration_seconds";

/// Adds one game to a user's counters, creating the row on first contribution.
///
/// Counters only ever grow; the caller's transaction decides whether the write is kept.
pub(crate) async fn apply(transaction: &mut Transaction<'_, Sqlite>, user: UserId, scope: GuildId, breakdown: &Breakdown, delta: &StatDelta) -> sqlx::Result<()> {
    let (key_column, key_placeholder, conflict) = match breakdown.key_column() {
        Some(column) => (format!(", {column}"), ", ?", format!("user_id, scope, {column}")),
        None => (String::new(), "", format!("user_id, scope")),
    };
    let sql = format!("
        INSERT INTO {table} (user_id, scope{key_column}, {TOTAL_COLUMNS})
        VALUES (?, ?{key_placeholder}, 1, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT ({conflict}) DO UPDATE SET
            total_games = total_games + 1,
            total_wins = total_wins + excluded.total_wins,
            total_kills = total_kills + excluded.total_kills,
            total_deaths = total_deaths + excluded.total_deaths,
            total_assists = total_assists + excluded.total_assists,
            total_gold = total_gold + excluded.total_gold,
            total_damage = total_damage + excluded.total_damage,
            total_team_kills = total_team_kills + excluded.total_team_kills,
            total_duration_seconds = total_duration_seconds + excluded.total_duration_seconds
    ", table = breakdown.table());
    let mut query = sqlx::query(&sql)
        .bind(Snowflake(user))
        .bind(Snowflake(scope));
    if let Some(key) = breakdown.key() {
        query = query.bind(key);
    }
    query
        .bind(i64::from(delta.win))
        .bind(delta.kills)
        .bind(delta.deaths)
        .bind(delta.assists)
        .bind(delta.gold)
        .bind(delta.damage)
        .bind(delta.team_kills)
        .bind(delta.duration_seconds)
        .execute(&mut **transaction)
        .await?;
    Ok(())
}

/// Every overall row of a scope.
pub(crate) async fn overall_for_scope(pool: &SqlitePool, scope: GuildId) -> sqlx::Result<Vec<UserTotals>> {
    sqlx::query_as::<_, UserTotals>(&format!("SELECT user_id, {TOTAL_COLUMNS} FROM overall_stats WHERE scope = ?"))
        .bind(Snowflake(scope))
        .fetch_all(pool)
        .await
}

/// A user's overall row, if they have played in the scope.
pub(crate) async fn overall_for_user(pool: &SqlitePool, scope: GuildId, user: UserId) -> sqlx::Result<Option<Totals>> {
    sqlx::query_as::<_, Totals>(&format!("SELECT {TOTAL_COLUMNS} FROM overall_stats WHERE scope = ? AND user_id = ?"))
        .bind(Snowflake(scope))
        .bind(Snowflake(user))
        .fetch_optional(pool)
        .await
}

/// A user's champion rows, most played first.
pub(crate) async fn champions_for_user(pool: &SqlitePool, scope: GuildId, user: UserId) -> sqlx::Result<Vec<KeyedTotals>> {
    sqlx::query_as::<_, KeyedTotals>(&format!("SELECT champion AS key, {TOTAL_COLUMNS} FROM champion_stats WHERE scope = ? AND user_id = ? ORDER BY total_games DESC, champion"))
        .bind(Snowflake(scope))
        .bind(Snowflake(user))
        .fetch_all(pool)
        .await
}

/// A user's role rows, most played first.
pub(crate) async fn roles_for_user(pool: &SqlitePool, scope: GuildId, user: UserId) -> sqlx::Result<Vec<KeyedTotals>> {
    sqlx::query_as::<_, KeyedTotals>(&format!("SELECT role AS key, {TOTAL_COLUMNS} FROM role_stats WHERE scope = ? AND user_id = ? ORDER BY total_games DESC, role"))
        .bind(Snowflake(scope))
        .bind(Snowflake(user))
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::db::{
            self,
            tests::pool,
        },
    };

    #[test]
    fn deathless_kda_uses_a_floor_of_one() {
        assert_eq!(kda(10, 0, 5), 15.0);
        assert_eq!(kda(3, 3, 3), 2.0);
    }

    #[test]
    fn empty_totals_have_zero_metrics() {
        let metrics = Totals::default().metrics();
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.gold_per_minute, 0.0);
        assert_eq!(metrics.damage_per_minute, 0.0);
        assert_eq!(metrics.kill_participation, 0.0);
    }

    #[test]
    fn per_minute_metrics_use_total_duration() {
        let totals = Totals {
            total_games: 2,
            total_wins: 1,
            total_kills: 6,
            total_assists: 4,
            total_gold: 24_000,
            total_damage: 60_000,
            total_team_kills: 40,
            total_duration_seconds: 2_400,
            ..Totals::default()
        };
        let metrics = totals.metrics();
        assert_eq!(metrics.win_rate, 0.5);
        assert_eq!(metrics.gold_per_minute, 600.0);
        assert_eq!(metrics.damage_per_minute, 1500.0);
        assert_eq!(metrics.kill_participation, 0.25);
    }

    #[tokio::test]
    async fn apply_accumulates_per_breakdown() {
        let pool = pool().await;
        let scope = GuildId::new(500);
        let user = UserId::new(42);
        let mut transaction = pool.begin().await.unwrap();
        db::ensure_scope(&mut transaction, scope).await.unwrap();
        let delta = StatDelta { win: true, kills: 5, deaths: 2, assists: 7, gold: 12_000, damage: 20_000, team_kills: 20, duration_seconds: 1_800 };
        apply(&mut transaction, user, scope, &Breakdown::Overall, &delta).await.unwrap();
        apply(&mut transaction, user, scope, &Breakdown::Overall, &StatDelta { win: false, ..delta }).await.unwrap();
        apply(&mut transaction, user, scope, &Breakdown::Champion(format!("Ahri")), &delta).await.unwrap();
        apply(&mut transaction, user, scope, &Breakdown::Role(format!("MID")), &delta).await.unwrap();
        transaction.commit().await.unwrap();

        let overall = overall_for_user(&pool, scope, user).await.unwrap().unwrap();
        assert_eq!(overall.total_games, 2);
        assert_eq!(overall.total_wins, 1);
        assert_eq!(overall.total_kills, 10);
        assert_eq!(overall.total_duration_seconds, 3_600);
        let champions = champions_for_user(&pool, scope, user).await.unwrap();
        assert_eq!(champions.len(), 1);
        assert_eq!(champions[0].key, "Ahri");
        assert_eq!(champions[0].totals.total_games, 1);
        let roles = roles_for_user(&pool, scope, user).await.unwrap();
        assert_eq!(roles[0].key, "MID");
        assert_eq!(overall_for_scope(&pool, scope).await.unwrap().len(), 1);
    }
}
