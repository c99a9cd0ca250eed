//! Registry of game accounts, unique per scope by name and tag.

use crate::{
    db,
    prelude::*,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("{name}#{tag} is already linked to a different Discord account")]
    OwnershipConflict {
        name: String,
        tag: String,
        owner: UserId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct Account {
    pub(crate) id: i64,
    pub(crate) scope: Snowflake<GuildId>,
    pub(crate) name: String,
    pub(crate) tag: String,
    pub(crate) owner: Option<Snowflake<UserId>>,
    pub(crate) global_id: Option<String>,
}

impl Account {
    pub(crate) fn owner(&self) -> Option<UserId> {
        self.owner.map(|Snowflake(owner)| owner)
    }

    pub(crate) fn riot_id(&self) -> String {
        format!("{}#{}", self.name, self.tag)
    }
}

/// Trims the name and collapses internal runs of whitespace to a single space.
pub(crate) fn normalize_name(name: &str) -> String {
    name.split_whitespace().join(" ")
}

pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_owned()
}

/// Read path of the registry: looks up an account without creating it.
pub(crate) async fn find(transaction: &mut Transaction<'_, Sqlite>, name: &str, tag: &str, scope: GuildId) -> sqlx::Result<Option<Account>> {
    sqlx::query_as::<_, Account>("SELECT id, scope, name, tag, owner, global_id FROM accounts WHERE scope = ? AND name = ? AND tag = ?")
        .bind(Snowflake(scope))
        .bind(normalize_name(name))
        .bind(normalize_tag(tag))
        .fetch_optional(&mut **transaction)
        .await
}

/// Looks up an account, creating an ownerless one on first sighting.
pub(crate) async fn resolve(transaction: &mut Transaction<'_, Sqlite>, name: &str, tag: &str, scope: GuildId) -> sqlx::Result<Account> {
    if let Some(account) = find(transaction, name, tag, scope).await? {
        return Ok(account)
    }
    db::ensure_scope(transaction, scope).await?;
    let account = sqlx::query_as::<_, Account>("INSERT INTO accounts (scope, name, tag, created_at) VALUES (?, ?, ?, ?) RETURNING id, scope, name, tag, owner, global_id")
        .bind(Snowflake(scope))
        .bind(normalize_name(name))
        .bind(normalize_tag(tag))
        .bind(Utc::now())
        .fetch_one(&mut **transaction)
        .await?;
    log::info!("created account {}#{} in scope {scope}", normalize_name(name), normalize_tag(tag));
    Ok(account)
}

/// Sets the owner of an account, or confirms it if it is already set to the same user.
pub(crate) async fn link_owner(transaction: &mut Transaction<'_, Sqlite>, account: &Account, owner: UserId) -> Result<Account, Error> {
    // re-read inside the transaction so a concurrent link is not overwritten
    let current = sqlx::query_scalar::<_, Option<Snowflake<UserId>>>("SELECT owner FROM accounts WHERE id = ?")
        .bind(account.id)
        .fetch_one(&mut **transaction)
        .await?;
    match current {
        Some(Snowflake(existing)) if existing != owner => return Err(Error::OwnershipConflict {
            name: account.name.clone(),
            tag: account.tag.clone(),
            owner: existing,
        }),
        Some(_) => {}
        None => {
            sqlx::query("UPDATE accounts SET owner = ? WHERE id = ? AND owner IS NULL")
                .bind(Snowflake(owner))
                .bind(account.id)
                .execute(&mut **transaction)
                .await?;
            log::info!("linked {} to user {owner}", account.riot_id());
        }
    }
    Ok(Account { owner: Some(Snowflake(owner)), ..account.clone() })
}

/// Records the identity provider's stable id for an account.
pub(crate) async fn set_global_id(transaction: &mut Transaction<'_, Sqlite>, account: &Account, global_id: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE accounts SET global_id = ? WHERE id = ?")
        .bind(global_id)
        .bind(account.id)
        .execute(&mut **transaction)
        .await?;
    Ok(())
}

/// All accounts of a scope as `name#tag`, used as hints for match extraction.
pub(crate) async fn names_in_scope(pool: &SqlitePool, scope: GuildId) -> sqlx::Result<Vec<String>> {
    let rows = sqlx::query_as::<_, (String, String)>("SELECT name, tag FROM accounts WHERE scope = ? ORDER BY name, tag")
        .bind(Snowflake(scope))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(name, tag)| format!("{name}#{tag}")).collect())
}

/// Accounts a user owns in a scope.
pub(crate) async fn owned_by(pool: &SqlitePool, scope: GuildId, owner: UserId) -> sqlx::Result<Vec<Account>> {
    sqlx::query_as::<_, Account>("SELECT id, scope, name, tag, owner, global_id FROM accounts WHERE scope = ? AND owner = ? ORDER BY name, tag")
        .bind(Snowflake(scope))
        .bind(Snowflake(owner))
        .fetch_all(pool)
        .await
}
