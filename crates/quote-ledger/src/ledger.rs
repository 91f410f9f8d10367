//! SQLite-backed quote ledger.

use crate::error::LedgerError;
use crate::types::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

const SELECT_COLUMNS: &str =
    "SELECT idx, user, channel, quote, realtext, submitter, date FROM quotes";

/// Append-and-delete-by-id quote store.
///
/// Ids come from an `AUTOINCREMENT` key, so they grow monotonically and a
/// deleted id is never handed out again.
#[derive(Clone)]
pub struct QuoteLedger {
    pool: SqlitePool,
}

impl QuoteLedger {
    /// Connection acquire timeout.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open (or create) the ledger at `path`. `:memory:` gives a private
    /// in-memory database.
    pub async fn open(path: &str) -> Result<Self, LedgerError> {
        let pool = if path == ":memory:" {
            // A uniquely named shared-cache database per call, so parallel
            // tests never see each other's rows.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:quote-ledger-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            // The database lives only as long as a connection does.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        warn!(path = %parent.display(), error = %e, "Failed to create ledger directory");
                    }
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        };

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                idx INTEGER PRIMARY KEY AUTOINCREMENT,
                user TEXT NOT NULL,
                channel TEXT NOT NULL,
                quote TEXT NOT NULL,
                realtext TEXT NOT NULL,
                submitter TEXT NOT NULL,
                date INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!(path = %path, "Quote ledger ready");

        Ok(Self { pool })
    }

    /// Store a new quote and return its id.
    #[instrument(skip(self, quote), fields(user = %quote.user, channel = %quote.channel))]
    pub async fn append(&self, quote: &NewQuote) -> Result<i64, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO quotes (user, channel, quote, realtext, submitter, date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&quote.user)
        .bind(&quote.channel)
        .bind(&quote.quote_text)
        .bind(&quote.source_text)
        .bind(&quote.submitter)
        .bind(quote.timestamp.timestamp())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Added quote #{}", id);
        Ok(id)
    }

    /// Store a record received from outside after validating it.
    pub async fn import(&self, quote: &NewQuote) -> Result<i64, LedgerError> {
        quote.validate().map_err(LedgerError::Invalid)?;
        self.append(quote).await
    }

    /// Delete a quote by id.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: i64) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM quotes WHERE idx = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }
        info!("Deleted quote #{}", id);
        Ok(())
    }

    /// Fetch a quote by id.
    pub async fn get(&self, id: i64) -> Result<Quote, LedgerError> {
        let row = sqlx::query_as::<_, QuoteRow>(&format!("{SELECT_COLUMNS} WHERE idx = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Quote::from_row).ok_or(LedgerError::NotFound(id))
    }

    /// Pick a quote uniformly at random.
    pub async fn find_random(&self, filter: &QuoteFilter) -> Result<Quote, LedgerError> {
        let row = match filter {
            QuoteFilter::All => {
                sqlx::query_as::<_, QuoteRow>(&format!(
                    "{SELECT_COLUMNS} ORDER BY RANDOM() LIMIT 1"
                ))
                .fetch_optional(&self.pool)
                .await?
            }
            QuoteFilter::ByUser(user) => {
                sqlx::query_as::<_, QuoteRow>(&format!(
                    "{SELECT_COLUMNS} WHERE user = ? COLLATE NOCASE ORDER BY RANDOM() LIMIT 1"
                ))
                .bind(user)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(Quote::from_row).ok_or(LedgerError::Empty)
    }

    /// Most recent quote whose text or source line contains `text`.
    pub async fn search(&self, text: &str) -> Result<Quote, LedgerError> {
        let pattern = format!("%{}%", escape_like(text));
        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            "{SELECT_COLUMNS} WHERE quote LIKE ? ESCAPE '\\' OR realtext LIKE ? ESCAPE '\\' \
             ORDER BY idx DESC LIMIT 1"
        ))
        .bind(&pattern)
        .bind(&pattern)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Quote::from_row).ok_or(LedgerError::Empty)
    }

    /// All matching quotes in id order.
    pub async fn list(&self, filter: &QuoteFilter) -> Result<Vec<Quote>, LedgerError> {
        let rows = match filter {
            QuoteFilter::All => {
                sqlx::query_as::<_, QuoteRow>(&format!("{SELECT_COLUMNS} ORDER BY idx"))
                    .fetch_all(&self.pool)
                    .await?
            }
            QuoteFilter::ByUser(user) => {
                sqlx::query_as::<_, QuoteRow>(&format!(
                    "{SELECT_COLUMNS} WHERE user = ? COLLATE NOCASE ORDER BY idx"
                ))
                .bind(user)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(Quote::from_row).collect())
    }

    /// Number of stored quotes.
    pub async fn count(&self) -> Result<i64, LedgerError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quotes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
