use {
    std::{
        num::NonZero,
        path::Path,
    },
    sqlx::{
        ConnectOptions as _,
        Database,
        Decode,
        Encode,
        sqlite::{
            SqliteConnectOptions,
            SqliteJournalMode,
            SqlitePoolOptions,
        },
    },
    crate::prelude::*,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)] Sql(#[from] sqlx::Error),
}

/// A wrapper around serenity's Discord snowflake types that can be stored in an SQL `INTEGER` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Snowflake<T>(pub(crate) T);

impl<'r, T: From<NonZero<u64>>, DB: Database> Decode<'r, DB> for Snowflake<T>
where i64: Decode<'r, DB> {
    fn decode(value: <DB as Database>::ValueRef<'r>) -> Result<Self, Box<dyn std::error::Error + 'static + Send + Sync>> {
        let id = i64::decode(value)?;
        let id = NonZero::try_from(id as u64)?;
        Ok(Self(id.into()))
    }
}

impl<'q, T: Copy + Into<i64>, DB: Database> Encode<'q, DB> for Snowflake<T>
where i64: Encode<'q, DB> {
    fn encode_by_ref(&self, buf: &mut <DB as Database>::ArgumentBuffer<'q>) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        self.0.into().encode(buf)
    }

    fn size_hint(&self) -> usize {
        Encode::size_hint(&self.0.into())
    }
}

impl<T, DB: Database> sqlx::Type<DB> for Snowflake<T>
where i64: sqlx::Type<DB> {
    fn type_info() -> <DB as Database>::TypeInfo {
        i64::type_info()
    }

    fn compatible(ty: &<DB as Database>::TypeInfo) -> bool {
        i64::compatible(ty)
    }
}

/// Opens the database file (creating it if necessary) and applies pending migrations.
pub(crate) async fn connect(path: &Path) -> Result<SqlitePool, Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(10));
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    log::info!("database ready at {}", path.display());
    Ok(pool)
}

/// Idempotently registers a guild as a scope.
pub(crate) async fn ensure_scope(transaction: &mut Transaction<'_, Sqlite>, scope: GuildId) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO scopes (id, created_at) VALUES (?, ?) ON CONFLICT (id) DO NOTHING")
        .bind(Snowflake(scope))
        .bind(Utc::now())
        .execute(&mut **transaction)
        .await?;
    Ok(())
}
