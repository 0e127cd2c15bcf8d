use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    model::{
        ChannelId, MessageRef, NewPinnedEntry, NewProfile, PinnedEntry, ProfileRecord,
        parse_timestamp, timestamp,
    },
    reconcile::PinLedger,
    token::Token,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("token {0} is already registered by another owner")]
    TokenTaken(Token),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
}

const PROFILE_COLUMNS: &str =
    "npub,telegram_user_id,telegram_username,telegram_name,added_at,web_consent,custom_name";
const PINNED_COLUMNS: &str = "id,chat_id,message_id,profile_count,is_current,created_at";

#[derive(FromRow)]
struct ProfileRow {
    npub: String,
    telegram_user_id: i64,
    telegram_username: Option<String>,
    telegram_name: Option<String>,
    added_at: String,
    web_consent: bool,
    custom_name: Option<String>,
}

impl TryFrom<ProfileRow> for ProfileRecord {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, StoreError> {
        let token = Token::parse(&row.npub)
            .ok_or_else(|| StoreError::Corrupt(format!("bad token {}", row.npub)))?;
        let registered_at = parse_timestamp(&row.added_at)
            .ok_or_else(|| StoreError::Corrupt(format!("bad added_at {}", row.added_at)))?;
        Ok(ProfileRecord {
            token,
            owner_id: row.telegram_user_id,
            display_handle: row.telegram_username,
            display_fallback_name: row.telegram_name,
            custom_name: row.custom_name,
            registered_at,
            public_consent: row.web_consent,
        })
    }
}

#[derive(FromRow)]
struct PinnedRow {
    id: i64,
    chat_id: i64,
    message_id: i64,
    profile_count: i64,
    is_current: bool,
    created_at: String,
}

impl TryFrom<PinnedRow> for PinnedEntry {
    type Error = StoreError;

    fn try_from(row: PinnedRow) -> Result<Self, StoreError> {
        let created_at = parse_timestamp(&row.created_at)
            .ok_or_else(|| StoreError::Corrupt(format!("bad created_at {}", row.created_at)))?;
        Ok(PinnedEntry {
            id: row.id,
            channel: ChannelId(row.chat_id),
            message: MessageRef(row.message_id),
            profile_count: row.profile_count,
            is_current: row.is_current,
            created_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Profiles and the pinned-message ledger, backed by one SQLite pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;
        let store = Self::with_pool(pool).await?;
        info!(database_url, "database ready");
        Ok(store)
    }

    /// Single-connection in-memory database, kept alive for the pool's lifetime.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS profiles (
                npub TEXT PRIMARY KEY,
                telegram_user_id INTEGER NOT NULL,
                telegram_username TEXT,
                telegram_name TEXT,
                added_at TEXT NOT NULL,
                web_consent INTEGER NOT NULL DEFAULT 0,
                custom_name TEXT DEFAULT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('profiles')")
                .fetch_all(&self.pool)
                .await?;
        if !columns.iter().any(|(name,)| name == "custom_name") {
            sqlx::query("ALTER TABLE profiles ADD COLUMN custom_name TEXT DEFAULT NULL")
                .execute(&self.pool)
                .await?;
            info!("added custom_name column to profiles");
        }

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS profiles_owner ON profiles (telegram_user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pinned_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                profile_count INTEGER NOT NULL DEFAULT 0,
                is_current INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS pinned_messages_current
             ON pinned_messages (chat_id, is_current)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns `false` when the token or the owner is already registered.
    pub async fn insert_if_absent(&self, profile: &NewProfile) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO profiles
             (npub,telegram_user_id,telegram_username,telegram_name,added_at,web_consent)
             VALUES (?,?,?,?,?,0)
             ON CONFLICT DO NOTHING",
        )
        .bind(profile.token.as_str())
        .bind(profile.owner_id)
        .bind(&profile.display_handle)
        .bind(&profile.display_fallback_name)
        .bind(timestamp(profile.registered_at))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Points the owner's record at a new token; custom name, consent and
    /// registration time are kept.
    pub async fn rebind_token_by_owner(
        &self,
        owner_id: i64,
        token: &Token,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE profiles SET npub=? WHERE telegram_user_id=?")
            .bind(token.as_str())
            .bind(owner_id)
            .execute(&self.pool)
            .await;
        match result {
            Ok(result) => Ok(result.rows_affected() > 0),
            Err(err) if is_unique_violation(&err) => Err(StoreError::TokenTaken(token.clone())),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn set_consent_by_owner(
        &self,
        owner_id: i64,
        consent: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE profiles SET web_consent=? WHERE telegram_user_id=?")
            .bind(consent)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `None` clears the override.
    pub async fn set_custom_name_by_token(
        &self,
        token: &Token,
        custom_name: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE profiles SET custom_name=? WHERE npub=?")
            .bind(custom_name)
            .bind(token.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_by_owner(&self, owner_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM profiles WHERE telegram_user_id=?")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Registration order.
    pub async fn list_all(&self) -> Result<Vec<ProfileRecord>, StoreError> {
        let rows: Vec<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY added_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    pub async fn list_consented(&self) -> Result<Vec<ProfileRecord>, StoreError> {
        let rows: Vec<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE web_consent=1
             ORDER BY added_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    pub async fn count_all(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_consented(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles WHERE web_consent=1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn find_by_owner(&self, owner_id: i64) -> Result<Option<ProfileRecord>, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE telegram_user_id=?"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProfileRecord::try_from).transpose()
    }

    /// Earliest registered profile whose token starts with `prefix`.
    pub async fn find_by_token_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<ProfileRecord>, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE instr(npub, ?)=1
             ORDER BY added_at ASC, rowid ASC LIMIT 1"
        ))
        .bind(prefix.to_ascii_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProfileRecord::try_from).transpose()
    }

    /// Case-insensitive match on the stored handle, without the `@`.
    pub async fn find_by_handle(
        &self,
        handle: &str,
    ) -> Result<Option<ProfileRecord>, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE lower(telegram_username)=lower(?)
             ORDER BY added_at ASC, rowid ASC LIMIT 1"
        ))
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProfileRecord::try_from).transpose()
    }

    /// Every ledger entry of the channel, oldest first.
    pub async fn history(&self, channel: ChannelId) -> Result<Vec<PinnedEntry>, StoreError> {
        let rows: Vec<PinnedRow> = sqlx::query_as(&format!(
            "SELECT {PINNED_COLUMNS} FROM pinned_messages WHERE chat_id=? ORDER BY id ASC"
        ))
        .bind(channel.0)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }
}

#[async_trait]
impl PinLedger for Store {
    async fn current(&self, channel: ChannelId) -> Result<Option<PinnedEntry>, StoreError> {
        let row: Option<PinnedRow> = sqlx::query_as(&format!(
            "SELECT {PINNED_COLUMNS} FROM pinned_messages WHERE chat_id=? AND is_current=1
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(channel.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PinnedEntry::try_from).transpose()
    }

    async fn append_and_supersede(&self, entry: NewPinnedEntry) -> Result<PinnedEntry, StoreError> {
        let created_at = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE pinned_messages SET is_current=0 WHERE chat_id=? AND is_current=1")
            .bind(entry.channel.0)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            "INSERT INTO pinned_messages (chat_id,message_id,profile_count,is_current,created_at)
             VALUES (?,?,?,1,?)",
        )
        .bind(entry.channel.0)
        .bind(entry.message.0)
        .bind(entry.profile_count)
        .bind(timestamp(created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PinnedEntry {
            id: result.last_insert_rowid(),
            channel: entry.channel,
            message: entry.message,
            profile_count: entry.profile_count,
            is_current: true,
            created_at: created_at.replace_nanosecond(0).unwrap_or(created_at),
        })
    }
}
