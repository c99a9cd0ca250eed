pub(crate) use {
    std::{
        fmt,
        str::FromStr,
        sync::Arc,
        time::Duration,
    },
    async_trait::async_trait,
    chrono::prelude::*,
    enum_iterator::{
        Sequence,
        all,
    },
    itertools::Itertools as _,
    serde::{
        Deserialize,
        Serialize,
    },
    serenity::model::id::{
        GuildId,
        UserId,
    },
    sqlx::{
        Sqlite,
        SqlitePool,
        Transaction,
    },
    crate::{
        config::Config,
        db::Snowflake,
    },
};
