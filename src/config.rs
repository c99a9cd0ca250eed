use {
    std::path::{
        Path,
        PathBuf,
    },
    crate::prelude::*,
};
#[cfg(unix)] use xdg::BaseDirectories;

const FILE_NAME: &str = "scrim-ledger.json";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[error("missing config file")]
    Missing,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Config {
    pub(crate) discord: ConfigDiscord,
    #[serde(default = "default_database_path")]
    pub(crate) database_path: PathBuf,
    pub(crate) riot: ConfigRiot,
    pub(crate) extraction: ConfigExtraction,
    #[serde(default)]
    pub(crate) ranking: ConfigRanking,
    #[serde(default = "default_workers")]
    pub(crate) workers: usize,
    /// Wizard sessions and pending confirmations idle for longer than this are dropped. Absent means they are kept until used or cancelled.
    #[serde(default)]
    pub(crate) session_idle_timeout_secs: Option<u64>,
}

fn default_database_path() -> PathBuf { PathBuf::from("scrim-ledger.sqlite3") }
fn default_workers() -> usize { 4 }

impl Config {
    pub(crate) async fn load(explicit: Option<&Path>) -> Result<Self, Error> {
        let path = match explicit {
            Some(path) => path.to_owned(),
            None => Self::discover().ok_or(Error::Missing)?,
        };
        log::info!("loading config from {}", path.display());
        let buf = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&buf)?)
    }

    #[cfg(unix)]
    fn discover() -> Option<PathBuf> {
        BaseDirectories::new().find_config_file(FILE_NAME)
    }

    #[cfg(not(unix))]
    fn discover() -> Option<PathBuf> {
        let path = Path::new("cfg").join(FILE_NAME);
        path.exists().then_some(path)
    }

    pub(crate) fn session_idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigDiscord {
    pub(crate) bot_token: String,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigRiot {
    pub(crate) api_key: String,
    /// Regional routing value for account-v1, e.g. `europe` or `americas`.
    #[serde(default = "default_riot_region")]
    pub(crate) region: String,
}

fn default_riot_region() -> String { format!("europe") }

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigExtraction {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix.
    pub(crate) endpoint: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigRanking {
    #[serde(default = "default_page_size")]
    pub(crate) page_size: usize,
    #[serde(default)]
    pub(crate) min_games: i64,
}

fn default_page_size() -> usize { 10 }

impl Default for ConfigRanking {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            min_games: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_sections() {
        let config = serde_json::from_str::<Config>(r#"{
            "discord": { "botToken": "token" },
            "riot": { "apiKey": "riot" },
            "extraction": { "endpoint": "https://api.example.com/v1", "apiKey": "key", "model": "vision" }
        }"#).unwrap();
        assert_eq!(config.ranking.page_size, 10);
        assert_eq!(config.ranking.min_games, 0);
        assert_eq!(config.workers, 4);
        assert_eq!(config.riot.region, "europe");
        assert_eq!(config.database_path, PathBuf::from("scrim-ledger.sqlite3"));
        assert!(config.session_idle_timeout().is_none());
    }

    #[test]
    fn idle_timeout_is_read_in_seconds() {
        let config = serde_json::from_str::<Config>(r#"{
            "discord": { "botToken": "token" },
            "riot": { "apiKey": "riot", "region": "americas" },
            "extraction": { "endpoint": "e", "apiKey": "k", "model": "m" },
            "ranking": { "pageSize": 5 },
            "sessionIdleTimeoutSecs": 900
        }"#).unwrap();
        assert_eq!(config.ranking.page_size, 5);
        assert_eq!(config.session_idle_timeout(), Some(Duration::from_secs(900)));
    }
}
