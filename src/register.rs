//! Writing matches to the ledger and folding them into the aggregate tables.

use {
    std::collections::HashSet,
    crate::{
        account::{
            self,
            Account,
        },
        db,
        prelude::*,
        stats::{
            self,
            Breakdown,
            StatDelta,
        },
        submission::{
            MATCH_SIZE,
            MatchSubmission,
            PlayerEntry,
            TeamLabel,
        },
    },
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Account(#[from] account::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("a match needs exactly {size} players, got {0}", size = MATCH_SIZE)]
    PlayerCount(usize),
    #[error("{0} appears more than once in the match")]
    DuplicatePlayer(String),
    #[error("these accounts are not registered in this server: {}", .missing.join(", "))]
    ValidationFailed {
        /// Every unregistered account as `name#tag`, in submission order.
        missing: Vec<String>,
    },
}

/// One player's line in a registered match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlayerResult {
    pub(crate) account: Account,
    pub(crate) team: TeamLabel,
    pub(crate) win: bool,
    pub(crate) kills: u32,
    pub(crate) deaths: u32,
    pub(crate) assists: u32,
    pub(crate) gold: Option<u32>,
    pub(crate) damage: Option<u32>,
    pub(crate) duration_seconds: Option<u32>,
    pub(crate) champion: Option<String>,
    pub(crate) role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MatchLedgerEntry {
    pub(crate) id: i64,
    pub(crate) scope: GuildId,
    pub(crate) registered_at: DateTime<Utc>,
    pub(crate) winning_team: TeamLabel,
    pub(crate) players: Vec<PlayerResult>,
}

/// Empty or whitespace-only champion and role names count as not attributed.
fn attribution(name: &Option<String>) -> Option<String> {
    name.as_deref().map(str::trim).filter(|name| !name.is_empty()).map(str::to_owned)
}

fn riot_key(entry: &PlayerEntry) -> (String, String) {
    // same folding as the NOCASE collation on the accounts table
    (account::normalize_name(&entry.account_name).to_ascii_lowercase(), account::normalize_tag(&entry.account_tag).to_ascii_lowercase())
}

/// Registers a complete match in a single transaction.
///
/// Every account is checked before anything is written, so a submission naming an unregistered
/// account leaves both the ledger and the aggregates untouched. Aggregates are only updated for
/// accounts that have an owner.
pub(crate) async fn register_match(pool: &SqlitePool, submission: &MatchSubmission, registered_by: Option<UserId>) -> Result<MatchLedgerEntry, Error> {
    if submission.entries.len() != MATCH_SIZE {
        return Err(Error::PlayerCount(submission.entries.len()))
    }
    let mut seen = HashSet::with_capacity(MATCH_SIZE);
    for entry in &submission.entries {
        if !seen.insert(riot_key(entry)) {
            return Err(Error::DuplicatePlayer(entry.riot_id()))
        }
    }
    let mut transaction = pool.begin().await?;
    db::ensure_scope(&mut transaction, submission.scope).await?;
    let mut missing = Vec::default();
    for entry in &submission.entries {
        if account::find(&mut transaction, &entry.account_name, &entry.account_tag, submission.scope).await?.is_none() {
            missing.push(entry.riot_id());
        }
    }
    if !missing.is_empty() {
        log::info!("rejected match in {}: {} unregistered accounts", submission.scope, missing.len());
        return Err(Error::ValidationFailed { missing })
    }
    let registered_at = Utc::now();
    let id = sqlx::query_scalar::<_, i64>("INSERT INTO matches (scope, winner, registered_by, registered_at) VALUES (?, ?, ?, ?) RETURNING id")
        .bind(Snowflake(submission.scope))
        .bind(submission.winning_team)
        .bind(registered_by.map(Snowflake))
        .bind(registered_at)
        .fetch_one(&mut *transaction)
        .await?;
    let mut players = Vec::with_capacity(MATCH_SIZE);
    for (slot, entry) in submission.entries.iter().enumerate() {
        let account = account::resolve(&mut transaction, &entry.account_name, &entry.account_tag, submission.scope).await?;
        let win = entry.team == submission.winning_team;
        let champion = attribution(&entry.champion_name);
        let role = attribution(&entry.role_name);
        sqlx::query("INSERT INTO match_players (match_id, slot, account, owner, team, win, kills, deaths, assists, gold, damage, duration_seconds, champion, role) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)")
            .bind(id)
            .bind(slot as i64)
            .bind(account.id)
            .bind(account.owner)
            .bind(entry.team)
            .bind(win)
            .bind(i64::from(entry.kills))
            .bind(i64::from(entry.deaths))
            .bind(i64::from(entry.assists))
            .bind(entry.gold.map(i64::from))
            .bind(entry.damage.map(i64::from))
            .bind(entry.duration_seconds.map(i64::from))
            .bind(champion.as_deref())
            .bind(role.as_deref())
            .execute(&mut *transaction)
            .await?;
        if let Some(owner) = account.owner() {
            let delta = StatDelta {
                win,
                kills: entry.kills.into(),
                deaths: entry.deaths.into(),
                assists: entry.assists.into(),
                gold: entry.gold.unwrap_or_default().into(),
                damage: entry.damage.unwrap_or_default().into(),
                team_kills: i64::try_from(submission.team_kills(entry.team)).unwrap_or(i64::MAX),
                duration_seconds: entry.duration_seconds.unwrap_or_default().into(),
            };
            stats::apply(&mut transaction, owner, submission.scope, &Breakdown::Overall, &delta).await?;
            if let Some(champion) = &champion {
                stats::apply(&mut transaction, owner, submission.scope, &Breakdown::Champion(champion.clone()), &delta).await?;
            }
            if let Some(role) = &role {
                stats::apply(&mut transaction, owner, submission.scope, &Breakdown::Role(role.clone()), &delta).await?;
            }
        }
        players.push(PlayerResult {
            account,
            team: entry.team,
            win,
            kills: entry.kills,
            deaths: entry.deaths,
            assists: entry.assists,
            gold: entry.gold,
            damage: entry.damage,
            duration_seconds: entry.duration_seconds,
            champion,
            role,
        });
    }
    transaction.commit().await?;
    log::info!("registered match {id} in {} ({} won)", submission.scope, submission.winning_team);
    Ok(MatchLedgerEntry { id, scope: submission.scope, registered_at, winning_team: submission.winning_team, players })
}

/// A user's line in one past match, for match history.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct RecentMatch {
    pub(crate) match_id: i64,
    pub(crate) registered_at: DateTime<Utc>,
    pub(crate) winner: TeamLabel,
    pub(crate) team: TeamLabel,
    pub(crate) win: bool,
    pub(crate) kills: i64,
    pub(crate) deaths: i64,
    pub(crate) assists: i64,
    pub(crate) champion: Option<String>,
    pub(crate) role: Option<String>,
}

/// The latest matches in a scope that involved any account owned by `owner`, newest first.
pub(crate) async fn recent_matches(pool: &SqlitePool, scope: GuildId, owner: UserId, limit: u32) -> sqlx::Result<Vec<RecentMatch>> {
    sqlx::query_as::<_, RecentMatch>("
        SELECT matches.id AS match_id, registered_at, winner, team, win, kills, deaths, assists, champion, role
        FROM match_players JOIN matches ON matches.id = match_players.match_id
        WHERE matches.scope = ? AND match_players.owner = ?
        ORDER BY matches.id DESC
        LIMIT ?
    ")
        .bind(Snowflake(scope))
        .bind(Snowflake(owner))
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            db::tests::pool,
            submission::tests::submission,
        },
    };

    const SCOPE: GuildId = GuildId::new(500);

    /// Registers `p0`..`p{count}` in the scope. `owners` maps slots to owning users.
    async fn seed_accounts(pool: &SqlitePool, count: usize, owners: &[(usize, UserId)]) {
        let mut transaction = pool.begin().await.unwrap();
        for slot in 0..count {
            let account = account::resolve(&mut transaction, &format!("p{slot}"), "EUW", SCOPE).await.unwrap();
            if let Some(&(_, owner)) = owners.iter().find(|(owned_slot, _)| *owned_slot == slot) {
                account::link_owner(&mut transaction, &account, owner).await.unwrap();
            }
        }
        transaction.commit().await.unwrap();
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}")).fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn registration_counts_one_game_per_owner() {
        let pool = pool().await;
        let (winner, loser) = (UserId::new(1), UserId::new(2));
        seed_accounts(&pool, MATCH_SIZE, &[(0, winner), (5, loser)]).await;

        let entry = register_match(&pool, &submission(SCOPE, TeamLabel::TeamA), Some(winner)).await.unwrap();
        assert_eq!(entry.players.len(), MATCH_SIZE);
        assert!(entry.players[..5].iter().all(|player| player.win));
        assert!(entry.players[5..].iter().all(|player| !player.win));
        let totals = stats::overall_for_user(&pool, SCOPE, winner).await.unwrap().unwrap();
        assert_eq!((totals.total_games, totals.total_wins), (1, 1));
        // team A has 5 players with 2 kills each
        assert_eq!(totals.total_team_kills, 10);
        let totals = stats::overall_for_user(&pool, SCOPE, loser).await.unwrap().unwrap();
        assert_eq!((totals.total_games, totals.total_wins), (1, 0));
        // the eight ownerless accounts contribute nothing
        assert_eq!(stats::overall_for_scope(&pool, SCOPE).await.unwrap().len(), 2);

        register_match(&pool, &submission(SCOPE, TeamLabel::TeamB), None).await.unwrap();
        let totals = stats::overall_for_user(&pool, SCOPE, winner).await.unwrap().unwrap();
        assert_eq!((totals.total_games, totals.total_wins), (2, 1));
        let totals = stats::overall_for_user(&pool, SCOPE, loser).await.unwrap().unwrap();
        assert_eq!((totals.total_games, totals.total_wins), (2, 1));
        assert_eq!(count(&pool, "matches").await, 2);
        assert_eq!(count(&pool, "match_players").await, 20);
    }

    #[tokio::test]
    async fn unregistered_accounts_are_all_reported_and_nothing_is_written() {
        let pool = pool().await;
        seed_accounts(&pool, 8, &[(0, UserId::new(1))]).await;
        match register_match(&pool, &submission(SCOPE, TeamLabel::TeamA), None).await {
            Err(Error::ValidationFailed { missing }) => assert_eq!(missing, vec![format!("p8#EUW"), format!("p9#EUW")]),
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(count(&pool, "matches").await, 0);
        assert_eq!(count(&pool, "match_players").await, 0);
        assert_eq!(count(&pool, "overall_stats").await, 0);
        assert_eq!(count(&pool, "accounts").await, 8);
    }

    #[tokio::test]
    async fn champion_and_role_rows_follow_attribution() {
        let pool = pool().await;
        let owner = UserId::new(1);
        seed_accounts(&pool, MATCH_SIZE, &[(0, owner)]).await;
        let mut match_submission = submission(SCOPE, TeamLabel::TeamA);
        match_submission.entries[0].champion_name = Some(format!("Ahri"));
        match_submission.entries[0].role_name = Some(format!("  "));
        match_submission.entries[0].gold = Some(9_000);
        match_submission.entries[0].duration_seconds = Some(1_800);
        register_match(&pool, &match_submission, None).await.unwrap();
        let champions = stats::champions_for_user(&pool, SCOPE, owner).await.unwrap();
        assert_eq!(champions.len(), 1);
        assert_eq!(champions[0].key, "Ahri");
        assert_eq!(champions[0].totals.metrics().gold_per_minute, 300.0);
        assert!(stats::roles_for_user(&pool, SCOPE, owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn champion_and_role_keys_ignore_case() {
        let pool = pool().await;
        let owner = UserId::new(1);
        seed_accounts(&pool, MATCH_SIZE, &[(0, owner)]).await;
        for (champion, role) in [("Ahri", "MID"), ("ahri", "Mid")] {
            let mut match_submission = submission(SCOPE, TeamLabel::TeamA);
            match_submission.entries[0].champion_name = Some(champion.to_owned());
            match_submission.entries[0].role_name = Some(role.to_owned());
            register_match(&pool, &match_submission, None).await.unwrap();
        }
        let champions = stats::champions_for_user(&pool, SCOPE, owner).await.unwrap();
        assert_eq!(champions.iter().map(|row| (row.key.as_str(), row.totals.total_games)).collect_vec(), vec![("Ahri", 2)]);
        let roles = stats::roles_for_user(&pool, SCOPE, owner).await.unwrap();
        assert_eq!(roles.iter().map(|row| (row.key.as_str(), row.totals.total_games)).collect_vec(), vec![("MID", 2)]);
    }

    #[tokio::test]
    async fn names_differing_beyond_ascii_case_are_different_players() {
        let pool = pool().await;
        seed_accounts(&pool, 8, &[]).await;
        let mut transaction = pool.begin().await.unwrap();
        let upper = account::resolve(&mut transaction, "Ärger", "EUW", SCOPE).await.unwrap();
        let lower = account::resolve(&mut transaction, "ärger", "EUW", SCOPE).await.unwrap();
        transaction.commit().await.unwrap();
        assert_ne!(upper.id, lower.id);
        let mut match_submission = submission(SCOPE, TeamLabel::TeamA);
        match_submission.entries[8].account_name = format!("Ärger");
        match_submission.entries[9].account_name = format!("ärger");
        let entry = register_match(&pool, &match_submission, None).await.unwrap();
        assert_eq!(entry.players[8].account.id, upper.id);
        assert_eq!(entry.players[9].account.id, lower.id);
    }

    #[tokio::test]
    async fn malformed_submissions_are_rejected_up_front() {
        let pool = pool().await;
        let mut short = submission(SCOPE, TeamLabel::TeamA);
        short.entries.pop();
        assert!(matches!(register_match(&pool, &short, None).await, Err(Error::PlayerCount(9))));
        let mut duplicated = submission(SCOPE, TeamLabel::TeamA);
        duplicated.entries[9].account_name = format!("P0");
        assert!(matches!(register_match(&pool, &duplicated, None).await, Err(Error::DuplicatePlayer(_))));
        assert_eq!(count(&pool, "scopes").await, 0);
    }

    #[tokio::test]
    async fn history_lists_the_owners_matches() {
        let pool = pool().await;
        let owner = UserId::new(1);
        seed_accounts(&pool, MATCH_SIZE, &[(7, owner)]).await;
        let first = register_match(&pool, &submission(SCOPE, TeamLabel::TeamA), None).await.unwrap();
        let second = register_match(&pool, &submission(SCOPE, TeamLabel::TeamB), None).await.unwrap();
        let history = recent_matches(&pool, SCOPE, owner, 5).await.unwrap();
        assert_eq!(history.iter().map(|row| row.match_id).collect_vec(), vec![second.id, first.id]);
        assert!(history[0].win);
        assert_eq!(history[0].team, TeamLabel::TeamB);
        assert!(!history[1].win);
        assert!(recent_matches(&pool, SCOPE, UserId::new(2), 5).await.unwrap().is_empty());
    }
}
