//! Verifying Riot IDs with Riot's account API and linking them to Discord users.

use crate::{
    account::{
        self,
        Account,
    },
    prelude::*,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum VerifyError {
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error("there is no Riot account named {name}#{tag}")]
    NotFound {
        name: String,
        tag: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Account(#[from] account::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error(transparent)] Verify(#[from] VerifyError),
}

/// An account as the identity provider knows it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct VerifiedAccount {
    #[serde(rename = "gameName")]
    pub(crate) canonical_name: String,
    #[serde(rename = "tagLine")]
    pub(crate) canonical_tag: String,
    #[serde(rename = "puuid")]
    pub(crate) global_id: String,
}

#[async_trait]
pub(crate) trait IdentityVerifier: Send + Sync {
    async fn verify(&self, name: &str, tag: &str) -> Result<VerifiedAccount, VerifyError>;
}

pub(crate) struct RiotClient {
    http_client: reqwest::Client,
    api_key: String,
    region: String,
}

impl RiotClient {
    pub(crate) fn new(http_client: reqwest::Client, config: &Config) -> Self {
        Self {
            http_client,
            api_key: config.riot.api_key.clone(),
            region: config.riot.region.clone(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for RiotClient {
    async fn verify(&self, name: &str, tag: &str) -> Result<VerifiedAccount, VerifyError> {
        let url = format!(
            "https://{}.api.riotgames.com/riot/account/v1/accounts/by-riot-id/{}/{}",
            self.region,
            urlencoding::encode(name),
            urlencoding::encode(tag),
        );
        let response = self.http_client.get(url)
            .header("X-Riot-Token", &self.api_key)
            .send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(VerifyError::NotFound { name: name.to_owned(), tag: tag.to_owned() })
        }
        Ok(response.error_for_status()?.json().await?)
    }
}

/// Verifies a Riot ID and links the resulting account to `owner`.
///
/// The account is stored under the provider's spelling of the name and tag, so later match
/// submissions using that spelling resolve to it.
pub(crate) async fn register_account(pool: &SqlitePool, verifier: &dyn IdentityVerifier, owner: UserId, name: &str, tag: &str, scope: GuildId) -> Result<Account, Error> {
    let verified = verifier.verify(&account::normalize_name(name), &account::normalize_tag(tag)).await?;
    let mut transaction = pool.begin().await?;
    let account = account::resolve(&mut transaction, &verified.canonical_name, &verified.canonical_tag, scope).await?;
    let account = account::link_owner(&mut transaction, &account, owner).await?;
    account::set_global_id(&mut transaction, &account, &verified.global_id).await?;
    transaction.commit().await?;
    Ok(Account { global_id: Some(verified.global_id), ..account })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::db::tests::pool,
    };

    /// Knows a fixed set of Riot IDs, matched case-insensitively like Riot does.
    struct FakeVerifier(Vec<VerifiedAccount>);

    #[async_trait]
    impl IdentityVerifier for FakeVerifier {
        async fn verify(&self, name: &str, tag: &str) -> Result<VerifiedAccount, VerifyError> {
            self.0.iter()
                .find(|account| account.canonical_name.eq_ignore_ascii_case(name) && account.canonical_tag.eq_ignore_ascii_case(tag))
                .cloned()
                .ok_or_else(|| VerifyError::NotFound { name: name.to_owned(), tag: tag.to_owned() })
        }
    }

    fn faker() -> FakeVerifier {
        FakeVerifier(vec![VerifiedAccount { canonical_name: format!("Hide on bush"), canonical_tag: format!("KR1"), global_id: format!("puuid-faker") }])
    }

    #[test]
    fn riot_account_json_is_decoded() {
        let account = serde_json::from_str::<VerifiedAccount>(r#"{"puuid":"abc","gameName":"Caps","tagLine":"EUW"}"#).unwrap();
        assert_eq!(account.canonical_name, "Caps");
        assert_eq!(account.global_id, "abc");
    }

    #[tokio::test]
    async fn registration_uses_the_canonical_spelling() {
        let pool = pool().await;
        let scope = GuildId::new(500);
        let account = register_account(&pool, &faker(), UserId::new(1), " hide  ON bush ", "#kr1", scope).await.unwrap();
        assert_eq!(account.riot_id(), "Hide on bush#KR1");
        assert_eq!(account.owner(), Some(UserId::new(1)));
        assert_eq!(account.global_id.as_deref(), Some("puuid-faker"));
        // registering again as the same user is fine
        register_account(&pool, &faker(), UserId::new(1), "Hide on bush", "KR1", scope).await.unwrap();
    }

    #[tokio::test]
    async fn registration_fails_for_unknown_or_taken_accounts() {
        let pool = pool().await;
        let scope = GuildId::new(500);
        assert!(matches!(
            register_account(&pool, &faker(), UserId::new(1), "Nobody", "EUW", scope).await,
            Err(Error::Verify(VerifyError::NotFound { .. })),
        ));
        register_account(&pool, &faker(), UserId::new(1), "Hide on bush", "KR1", scope).await.unwrap();
        assert!(matches!(
            register_account(&pool, &faker(), UserId::new(2), "Hide on bush", "KR1", scope).await,
            Err(Error::Account(account::Error::OwnershipConflict { .. })),
        ));
        // a different server is a separate registry
        register_account(&pool, &faker(), UserId::new(2), "Hide on bush", "KR1", GuildId::new(501)).await.unwrap();
    }
}
