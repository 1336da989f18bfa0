//! SQLite-backed CDR store using sqlx.
//!
//! Timestamps are persisted as unix-epoch seconds so the windowed aggregates
//! stay integer arithmetic inside SQL; chrono types live at the trait
//! boundary only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{MonitorError, Result};

use super::store::{CallVolume, CdrStore, HourlyBucket};
use super::{CallDetailRecord, CdrUpdate, Disposition};

/// SQLite CDR store.
#[derive(Clone)]
pub struct SqliteCdrStore {
    pool: SqlitePool,
}

/// Row shape matching the call_records table.
#[derive(sqlx::FromRow)]
struct DbCallRecord {
    unique_id: String,
    start_ts: i64,
    answer_ts: Option<i64>,
    end_ts: Option<i64>,
    source: String,
    destination: String,
    context: String,
    channel: String,
    peer_channel: Option<String>,
    last_application: Option<String>,
    last_application_data: Option<String>,
    duration_seconds: i64,
    billable_seconds: i64,
    disposition: String,
    account_code: Option<String>,
    caller_number: Option<String>,
}

fn storage_err(e: sqlx::Error) -> MonitorError {
    MonitorError::Storage(anyhow::Error::new(e))
}

fn to_epoch(ts: DateTime<Utc>) -> i64 {
    ts.timestamp()
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}

impl From<DbCallRecord> for CallDetailRecord {
    fn from(row: DbCallRecord) -> Self {
        CallDetailRecord {
            unique_id: row.unique_id,
            start: from_epoch(row.start_ts),
            answer: row.answer_ts.map(from_epoch),
            end: row.end_ts.map(from_epoch),
            source: row.source,
            destination: row.destination,
            context: row.context,
            channel: row.channel,
            peer_channel: row.peer_channel,
            last_application: row.last_application,
            last_application_data: row.last_application_data,
            duration_seconds: row.duration_seconds,
            billable_seconds: row.billable_seconds,
            disposition: Disposition::parse(&row.disposition).unwrap_or(Disposition::NoAnswer),
            account_code: row.account_code,
            caller_number: row.caller_number,
        }
    }
}

const SELECT_COLUMNS: &str = "unique_id, start_ts, answer_ts, end_ts, source, destination, \
     context, channel, peer_channel, last_application, last_application_data, \
     duration_seconds, billable_seconds, disposition, account_code, caller_number";

impl SqliteCdrStore {
    /// Connect to a SQLite database and make sure the call_records table
    /// exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("🗄️ Connecting CDR store: {}", database_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps every handle on
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        debug!("📋 Ensuring call_records schema");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS call_records (
                unique_id TEXT PRIMARY KEY,
                start_ts INTEGER NOT NULL,
                answer_ts INTEGER,
                end_ts INTEGER,
                source TEXT NOT NULL DEFAULT '',
                destination TEXT NOT NULL DEFAULT '',
                context TEXT NOT NULL DEFAULT '',
                channel TEXT NOT NULL DEFAULT '',
                peer_channel TEXT,
                last_application TEXT,
                last_application_data TEXT,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                billable_seconds INTEGER NOT NULL DEFAULT 0,
                disposition TEXT NOT NULL DEFAULT 'NO_ANSWER',
                account_code TEXT,
                caller_number TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_call_records_start ON call_records (start_ts)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl CdrStore for SqliteCdrStore {
    async fn find_by_unique_id(&self, unique_id: &str) -> Result<Option<CallDetailRecord>> {
        let row = sqlx::query_as::<_, DbCallRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM call_records WHERE unique_id = ?1"
        ))
        .bind(unique_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(CallDetailRecord::from))
    }

    async fn create(&self, record: &CallDetailRecord) -> Result<bool> {
        // Conflict-tolerant on the primary key: a concurrent or replayed
        // create for the same unique id leaves the first row in place.
        let result = sqlx::query(
            "INSERT INTO call_records (
                unique_id, start_ts, answer_ts, end_ts, source, destination,
                context, channel, peer_channel, last_application,
                last_application_data, duration_seconds, billable_seconds,
                disposition, account_code, caller_number
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(unique_id) DO NOTHING",
        )
        .bind(&record.unique_id)
        .bind(to_epoch(record.start))
        .bind(record.answer.map(to_epoch))
        .bind(record.end.map(to_epoch))
        .bind(&record.source)
        .bind(&record.destination)
        .bind(&record.context)
        .bind(&record.channel)
        .bind(&record.peer_channel)
        .bind(&record.last_application)
        .bind(&record.last_application_data)
        .bind(record.duration_seconds)
        .bind(record.billable_seconds)
        .bind(record.disposition.as_str())
        .bind(&record.account_code)
        .bind(&record.caller_number)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            debug!("🗄️ Created CDR for {}", record.unique_id);
        } else {
            debug!("🗄️ CDR for {} already present, create skipped", record.unique_id);
        }
        Ok(inserted)
    }

    async fn update(&self, unique_id: &str, changes: CdrUpdate) -> Result<bool> {
        // The end timestamp is write-once: a completion update (one carrying
        // an end) matches no row once the teardown is recorded.
        let result = sqlx::query(
            "UPDATE call_records SET
                end_ts = COALESCE(?1, end_ts),
                disposition = COALESCE(?2, disposition),
                duration_seconds = COALESCE(?3, duration_seconds),
                billable_seconds = COALESCE(?4, billable_seconds),
                caller_number = COALESCE(?5, caller_number)
             WHERE unique_id = ?6 AND (?1 IS NULL OR end_ts IS NULL)",
        )
        .bind(changes.end.map(to_epoch))
        .bind(changes.disposition.map(|d| d.as_str()))
        .bind(changes.duration_seconds)
        .bind(changes.billable_seconds)
        .bind(changes.caller_number)
        .bind(unique_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn call_volume_since(&self, since: DateTime<Utc>) -> Result<CallVolume> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN disposition = 'ANSWERED' THEN 1 ELSE 0 END), 0)
                        AS answered
             FROM call_records WHERE start_ts >= ?1",
        )
        .bind(to_epoch(since))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(CallVolume {
            total: row.get("total"),
            answered: row.get("answered"),
        })
    }

    async fn hourly_histogram(&self, since: DateTime<Utc>) -> Result<Vec<HourlyBucket>> {
        let rows = sqlx::query(
            "SELECT (start_ts / 3600) * 3600 AS hour_start, COUNT(*) AS total
             FROM call_records WHERE start_ts >= ?1
             GROUP BY hour_start ORDER BY hour_start",
        )
        .bind(to_epoch(since))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|row| HourlyBucket {
                hour_start: from_epoch(row.get("hour_start")),
                total: row.get("total"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(unique_id: &str, start: DateTime<Utc>, disposition: Disposition) -> CallDetailRecord {
        CallDetailRecord {
            unique_id: unique_id.to_string(),
            start,
            answer: None,
            end: None,
            source: "5550100".to_string(),
            destination: "2001".to_string(),
            context: "from-trunk".to_string(),
            channel: "PJSIP/trunk-0001".to_string(),
            peer_channel: None,
            last_application: None,
            last_application_data: None,
            duration_seconds: 0,
            billable_seconds: 0,
            disposition,
            account_code: None,
            caller_number: None,
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let store = SqliteCdrStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .create(&record("1.1", now, Disposition::Answered))
            .await
            .unwrap();

        let found = store.find_by_unique_id("1.1").await.unwrap().unwrap();
        assert_eq!(found.unique_id, "1.1");
        assert_eq!(found.disposition, Disposition::Answered);
        assert_eq!(found.start.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn duplicate_create_keeps_first_row() {
        let store = SqliteCdrStore::in_memory().await.unwrap();
        let now = Utc::now();

        let first = store
            .create(&record("1.2", now, Disposition::Answered))
            .await
            .unwrap();
        let second = store
            .create(&record("1.2", now, Disposition::Failed))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let found = store.find_by_unique_id("1.2").await.unwrap().unwrap();
        assert_eq!(found.disposition, Disposition::Answered);
    }

    #[tokio::test]
    async fn completion_update_is_write_once() {
        let store = SqliteCdrStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .create(&record("1.4", now, Disposition::NoAnswer))
            .await
            .unwrap();

        let first = store
            .update(
                "1.4",
                CdrUpdate {
                    end: Some(now + Duration::seconds(30)),
                    disposition: Some(Disposition::Answered),
                    duration_seconds: Some(30),
                    billable_seconds: Some(25),
                    caller_number: None,
                },
            )
            .await
            .unwrap();
        assert!(first);

        // A second completion matches no row; the recorded teardown stands.
        let second = store
            .update(
                "1.4",
                CdrUpdate {
                    end: Some(now + Duration::seconds(90)),
                    disposition: Some(Disposition::Answered),
                    duration_seconds: Some(90),
                    billable_seconds: Some(85),
                    caller_number: None,
                },
            )
            .await
            .unwrap();
        assert!(!second);

        let found = store.find_by_unique_id("1.4").await.unwrap().unwrap();
        assert_eq!(found.duration_seconds, 30);
        assert_eq!(found.billable_seconds, 25);
        assert_eq!(
            found.end.unwrap().timestamp(),
            (now + Duration::seconds(30)).timestamp()
        );

        // Field corrections without an end still go through.
        let caller_only = store
            .update(
                "1.4",
                CdrUpdate {
                    caller_number: Some("5550100".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(caller_only);
    }

    #[tokio::test]
    async fn update_widens_only_provided_fields() {
        let store = SqliteCdrStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .create(&record("1.3", now, Disposition::NoAnswer))
            .await
            .unwrap();

        store
            .update(
                "1.3",
                CdrUpdate {
                    end: Some(now + Duration::seconds(42)),
                    disposition: Some(Disposition::Answered),
                    duration_seconds: Some(42),
                    billable_seconds: Some(30),
                    caller_number: Some("5550100".to_string()),
                },
            )
            .await
            .unwrap();

        store
            .update(
                "1.3",
                CdrUpdate {
                    duration_seconds: Some(43),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let found = store.find_by_unique_id("1.3").await.unwrap().unwrap();
        assert_eq!(found.disposition, Disposition::Answered);
        assert_eq!(found.duration_seconds, 43);
        assert_eq!(found.billable_seconds, 30);
        assert_eq!(found.caller_number.as_deref(), Some("5550100"));
        assert!(found.end.is_some());
    }

    #[tokio::test]
    async fn volume_counts_window_and_dispositions() {
        let store = SqliteCdrStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .create(&record("2.1", now, Disposition::Answered))
            .await
            .unwrap();
        store
            .create(&record("2.2", now, Disposition::NoAnswer))
            .await
            .unwrap();
        store
            .create(&record(
                "2.3",
                now - Duration::days(2),
                Disposition::Answered,
            ))
            .await
            .unwrap();

        let volume = store
            .call_volume_since(now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(volume.total, 2);
        assert_eq!(volume.answered, 1);
        assert_eq!(volume.abandoned(), 1);
    }

    #[tokio::test]
    async fn histogram_groups_by_hour() {
        let store = SqliteCdrStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .create(&record("3.1", now, Disposition::Answered))
            .await
            .unwrap();
        store
            .create(&record("3.2", now, Disposition::NoAnswer))
            .await
            .unwrap();
        store
            .create(&record(
                "3.3",
                now - Duration::hours(2),
                Disposition::Answered,
            ))
            .await
            .unwrap();

        let buckets = store
            .hourly_histogram(now - Duration::hours(6))
            .await
            .unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets.last().unwrap().total, 2);
    }
}
