//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `UserStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Report submissions are stored one row each, so appending is a plain `INSERT`
//! and concurrent submissions from the same user can never overwrite each other.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use study_tracker_core::domain::{StudyDay, UserRecord, UserStatus};
use study_tracker_core::ports::{PortError, PortResult, UserStore};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `UserStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Attaches report and rest history to the given user rows, preserving their order.
    /// With `only_day` set, history for every other day is left out of the queries.
    async fn load_records(
        &self,
        rows: Vec<UserRow>,
        only_day: Option<StudyDay>,
    ) -> PortResult<Vec<UserRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = rows.iter().map(|r| r.user_id.clone()).collect();
        let only_day = only_day.map(|d| d.date());

        let reports = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT user_id, study_day, sections FROM report_entries
            WHERE user_id = ANY($1) AND ($2::date IS NULL OR study_day = $2)
            ORDER BY id
            "#,
        )
        .bind(&ids)
        .bind(only_day)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let rests = sqlx::query_as::<_, DayRow>(
            r#"
            SELECT user_id, study_day FROM rest_days
            WHERE user_id = ANY($1) AND ($2::date IS NULL OR study_day = $2)
            "#,
        )
        .bind(&ids)
        .bind(only_day)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let report_days = sqlx::query_as::<_, DayRow>(
            r#"
            SELECT user_id, study_day FROM report_days
            WHERE user_id = ANY($1) AND ($2::date IS NULL OR study_day = $2)
            "#,
        )
        .bind(&ids)
        .bind(only_day)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        assemble_records(rows, reports, rests, report_days)
    }
}

/// Groups history rows under their users. Users keep the order of `rows`; entries
/// keep the order of `reports`. Rows for users not in `rows` are ignored.
fn assemble_records(
    rows: Vec<UserRow>,
    reports: Vec<ReportRow>,
    rests: Vec<DayRow>,
    report_days: Vec<DayRow>,
) -> PortResult<Vec<UserRecord>> {
    let mut records: BTreeMap<String, UserRecord> = BTreeMap::new();
    let mut order = Vec::with_capacity(rows.len());
    for row in rows {
        order.push(row.user_id.clone());
        records.insert(row.user_id.clone(), row.to_domain()?);
    }
    for day in report_days {
        if let Some(record) = records.get_mut(&day.user_id) {
            record.report.entry(StudyDay::new(day.study_day)).or_default();
        }
    }
    for report in reports {
        if let Some(record) = records.get_mut(&report.user_id) {
            let sections = to_u32(report.sections, "report entry", &report.user_id)?;
            record
                .report
                .entry(StudyDay::new(report.study_day))
                .or_default()
                .push(sections);
        }
    }
    for rest in rests {
        if let Some(record) = records.get_mut(&rest.user_id) {
            record.rest.insert(StudyDay::new(rest.study_day), true);
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|id| records.remove(&id))
        .collect())
}

fn to_u32(value: i64, what: &str, user_id: &str) -> PortResult<u32> {
    u32::try_from(value).map_err(|_| {
        PortError::Unexpected(format!("Stored {} {} out of range for user {}", what, value, user_id))
    })
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps a foreign key violation on `users` to `NotFound`.
fn missing_user(user_id: &str) -> impl FnOnce(sqlx::Error) -> PortError + '_ {
    move |e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            PortError::NotFound(format!("User {} not found", user_id))
        }
        other => unexpected(other),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRow {
    user_id: String,
    status: String,
    daily_target: Option<i64>,
}
impl UserRow {
    fn to_domain(self) -> PortResult<UserRecord> {
        let status = UserStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown status '{}' for user {}", self.status, self.user_id))
        })?;
        let daily_target = self
            .daily_target
            .map(|t| to_u32(t, "target", &self.user_id))
            .transpose()?;
        Ok(UserRecord {
            status,
            daily_target,
            ..UserRecord::awaiting_target(self.user_id)
        })
    }
}

#[derive(FromRow)]
struct ReportRow {
    user_id: String,
    study_day: NaiveDate,
    sections: i64,
}

/// A `(user_id, study_day)` row from `rest_days` or `report_days`.
#[derive(FromRow)]
struct DayRow {
    user_id: String,
    study_day: NaiveDate,
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for DbAdapter {
    async fn get_user(&self, user_id: &str) -> PortResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, status, daily_target FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match row {
            Some(row) => Ok(self.load_records(vec![row], None).await?.pop()),
            None => Ok(None),
        }
    }

    async fn begin_onboarding(&self, user_id: &str) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, status) VALUES ($1, 'AWAITING_TARGET')
            ON CONFLICT (user_id) DO UPDATE SET status = EXCLUDED.status, updated_at = now()
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn activate(&self, user_id: &str, daily_target: u32, day: StudyDay) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, status, daily_target) VALUES ($1, 'ACTIVE', $2)
            ON CONFLICT (user_id) DO UPDATE
                SET status = 'ACTIVE', daily_target = EXCLUDED.daily_target, updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(i64::from(daily_target))
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO report_days (user_id, study_day) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(day.date())
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn mark_rest_day(&self, user_id: &str, day: StudyDay) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO rest_days (user_id, study_day) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(day.date())
        .execute(&self.pool)
        .await
        .map_err(missing_user(user_id))?;
        Ok(())
    }

    async fn append_report(
        &self,
        user_id: &str,
        day: StudyDay,
        sections: u32,
    ) -> PortResult<Vec<u32>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("INSERT INTO report_entries (user_id, study_day, sections) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(day.date())
            .bind(i64::from(sections))
            .execute(&mut *tx)
            .await
            .map_err(missing_user(user_id))?;

        let entries: Vec<i64> = sqlx::query_scalar(
            "SELECT sections FROM report_entries WHERE user_id = $1 AND study_day = $2 ORDER BY id",
        )
        .bind(user_id)
        .bind(day.date())
        .fetch_all(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;

        entries
            .into_iter()
            .map(|n| to_u32(n, "report entry", user_id))
            .collect()
    }

    async fn list_users_by_status(
        &self,
        status: UserStatus,
        day: StudyDay,
    ) -> PortResult<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, status, daily_target FROM users WHERE status = $1 ORDER BY user_id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        self.load_records(rows, Some(day)).await
    }

    async fn list_users(&self) -> PortResult<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, status, daily_target FROM users ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        self.load_records(rows, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn day(d: u32) -> StudyDay {
        StudyDay::new(date(d))
    }

    fn user(user_id: &str, status: &str, target: Option<i64>) -> UserRow {
        UserRow {
            user_id: user_id.to_string(),
            status: status.to_string(),
            daily_target: target,
        }
    }

    fn report(user_id: &str, d: u32, sections: i64) -> ReportRow {
        ReportRow {
            user_id: user_id.to_string(),
            study_day: date(d),
            sections,
        }
    }

    fn day_row(user_id: &str, d: u32) -> DayRow {
        DayRow {
            user_id: user_id.to_string(),
            study_day: date(d),
        }
    }

    #[test]
    fn history_is_grouped_per_user_in_row_order() {
        let rows = vec![user("U2", "ACTIVE", Some(3)), user("U1", "ACTIVE", Some(2))];
        let reports = vec![
            report("U1", 10, 4),
            report("U2", 10, 1),
            report("U1", 10, 2),
            report("U1", 9, 7),
            report("U9", 10, 1),
        ];
        let rests = vec![day_row("U2", 9), day_row("U9", 9)];

        let records = assemble_records(rows, reports, rests, Vec::new()).unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["U2", "U1"]);
        assert_eq!(records[1].reports_on(day(10)), &[4, 2]);
        assert_eq!(records[1].reports_on(day(9)), &[7]);
        assert_eq!(records[0].reports_on(day(10)), &[1]);
        assert!(records[0].is_rest_day(day(9)));
        assert!(records[1].rest.is_empty());
    }

    #[test]
    fn report_days_create_empty_sequences_without_clobbering_entries() {
        let rows = vec![user("U1", "ACTIVE", Some(3))];
        let reports = vec![report("U1", 10, 2)];
        let report_days = vec![day_row("U1", 10), day_row("U1", 11)];

        let records = assemble_records(rows, reports, Vec::new(), report_days).unwrap();

        assert_eq!(records[0].report.get(&day(10)), Some(&vec![2]));
        assert_eq!(records[0].report.get(&day(11)), Some(&Vec::new()));
    }

    #[test]
    fn targets_above_i32_survive_the_round_trip() {
        let records = assemble_records(
            vec![user("U1", "ACTIVE", Some(i64::from(u32::MAX)))],
            vec![report("U1", 10, 3_000_000_000)],
            Vec::new(),
            Vec::new(),
        )
        .unwrap();

        assert_eq!(records[0].daily_target, Some(u32::MAX));
        assert_eq!(records[0].reports_on(day(10)), &[3_000_000_000]);
    }

    #[test]
    fn corrupt_rows_are_reported_as_unexpected() {
        let bad_status = assemble_records(
            vec![user("U1", "PAUSED", None)],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(bad_status, Err(PortError::Unexpected(_))));

        let negative = assemble_records(
            vec![user("U1", "ACTIVE", Some(3))],
            vec![report("U1", 10, -1)],
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(negative, Err(PortError::Unexpected(_))));
    }

    // The tests below run against a real database:
    // `DATABASE_URL=postgres://... cargo test -p api -- --ignored`

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn activation_stores_large_targets_and_an_empty_day(pool: PgPool) {
        let db = DbAdapter::new(pool);
        db.begin_onboarding("U1").await.unwrap();

        db.activate("U1", 3_000_000_000, day(10)).await.unwrap();

        let user = db.get_user("U1").await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.daily_target, Some(3_000_000_000));
        assert_eq!(user.report.get(&day(10)), Some(&Vec::new()));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn reactivation_keeps_existing_entries(pool: PgPool) {
        let db = DbAdapter::new(pool);
        db.activate("U1", 3, day(10)).await.unwrap();
        db.append_report("U1", day(10), 2).await.unwrap();
        db.begin_onboarding("U1").await.unwrap();

        db.activate("U1", 5, day(10)).await.unwrap();

        let user = db.get_user("U1").await.unwrap().unwrap();
        assert_eq!(user.daily_target, Some(5));
        assert_eq!(user.reports_on(day(10)), &[2]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn appends_return_the_day_in_submission_order(pool: PgPool) {
        let db = DbAdapter::new(pool);
        db.activate("U1", 3, day(10)).await.unwrap();

        assert_eq!(db.append_report("U1", day(10), 4).await.unwrap(), vec![4]);
        assert_eq!(db.append_report("U1", day(11), 9).await.unwrap(), vec![9]);
        assert_eq!(db.append_report("U1", day(10), 1).await.unwrap(), vec![4, 1]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn writes_for_unknown_users_are_not_found(pool: PgPool) {
        let db = DbAdapter::new(pool);

        let append = db.append_report("ghost", day(10), 1).await;
        assert!(matches!(append, Err(PortError::NotFound(_))));
        let rest = db.mark_rest_day("ghost", day(10)).await;
        assert!(matches!(rest, Err(PortError::NotFound(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn concurrent_appends_are_both_recorded(pool: PgPool) {
        let db = DbAdapter::new(pool);
        db.activate("U1", 3, day(10)).await.unwrap();

        let first = tokio::spawn({
            let db = db.clone();
            async move { db.append_report("U1", day(10), 1).await }
        });
        let second = tokio::spawn({
            let db = db.clone();
            async move { db.append_report("U1", day(10), 2).await }
        });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let mut entries = db.get_user("U1").await.unwrap().unwrap().report[&day(10)].clone();
        entries.sort_unstable();
        assert_eq!(entries, vec![1, 2]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn status_listing_only_loads_the_requested_day(pool: PgPool) {
        let db = DbAdapter::new(pool);
        db.activate("U2", 3, day(9)).await.unwrap();
        db.append_report("U2", day(9), 5).await.unwrap();
        db.mark_rest_day("U2", day(9)).await.unwrap();
        db.append_report("U2", day(10), 1).await.unwrap();
        db.activate("U1", 2, day(10)).await.unwrap();
        db.begin_onboarding("U3").await.unwrap();

        let active = db
            .list_users_by_status(UserStatus::Active, day(10))
            .await
            .unwrap();

        let ids: Vec<&str> = active.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["U1", "U2"]);
        assert_eq!(active[1].report.len(), 1);
        assert_eq!(active[1].reports_on(day(10)), &[1]);
        assert!(active[1].rest.is_empty());
        assert_eq!(active[0].report.get(&day(10)), Some(&Vec::new()));
        assert_eq!(db.list_users().await.unwrap().len(), 3);
    }
}
