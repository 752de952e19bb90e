//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints (reminder job triggers,
//! user listing, health) and the master definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use study_tracker_core::{ReminderJob, ReminderSummary, UserRecord};
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::webhook::webhook_handler,
        unchecked_notice_handler,
        midday_reminder_handler,
        late_reminder_handler,
        list_users_handler,
        health_handler,
    ),
    components(
        schemas(JobRunResponse, UserResponse)
    ),
    tags(
        (name = "Study Tracker API", description = "LINE webhook and reminder job triggers for the study tracker bot.")
    )
)]
pub struct ApiDoc;

/// The served OpenAPI document. `/users` only appears when the deployment exposes it.
pub fn api_doc(expose_user_list: bool) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if !expose_user_list {
        doc.paths.paths.remove("/users");
    }
    doc
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The outcome of one reminder job run.
#[derive(Serialize, ToSchema)]
pub struct JobRunResponse {
    job: String,
    /// The study day the job inspected, `YYYY-MM-DD`.
    study_day: String,
    /// Pushes attempted, including ones that failed.
    notified: usize,
}

impl From<ReminderSummary> for JobRunResponse {
    fn from(summary: ReminderSummary) -> Self {
        Self {
            job: summary.job.name().to_string(),
            study_day: summary.study_day.to_string(),
            notified: summary.notified,
        }
    }
}

/// One user record as stored.
#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    user_id: String,
    status: String,
    daily_target: Option<u32>,
    report: BTreeMap<String, Vec<u32>>,
    rest: BTreeMap<String, bool>,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            status: user.status.as_str().to_string(),
            daily_target: user.daily_target,
            report: user
                .report
                .into_iter()
                .map(|(day, entries)| (day.to_string(), entries))
                .collect(),
            rest: user
                .rest
                .into_iter()
                .map(|(day, flag)| (day.to_string(), flag))
                .collect(),
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

async fn run_job(
    app_state: &AppState,
    job: ReminderJob,
) -> Result<Json<JobRunResponse>, (StatusCode, String)> {
    match app_state.scheduler.run(job).await {
        Ok(summary) => Ok(Json(summary.into())),
        Err(e) => {
            error!("Reminder job {} failed: {:?}", job.name(), e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Reminder job {} failed", job.name()),
            ))
        }
    }
}

/// Notify active users who reported nothing on the previous study day.
#[utoipa::path(
    get,
    path = "/jobs/unchecked-notice",
    responses(
        (status = 200, description = "Job ran", body = JobRunResponse),
        (status = 500, description = "Users could not be loaded")
    )
)]
pub async fn unchecked_notice_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<JobRunResponse>, (StatusCode, String)> {
    run_job(&app_state, ReminderJob::UncheckedNotice).await
}

/// Remind active users who are below their target for today.
#[utoipa::path(
    get,
    path = "/jobs/midday-reminder",
    responses(
        (status = 200, description = "Job ran", body = JobRunResponse),
        (status = 500, description = "Users could not be loaded")
    )
)]
pub async fn midday_reminder_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<JobRunResponse>, (StatusCode, String)> {
    run_job(&app_state, ReminderJob::MidDayReminder).await
}

/// Last reminder of the day, with the number of reports still missing.
#[utoipa::path(
    get,
    path = "/jobs/late-reminder",
    responses(
        (status = 200, description = "Job ran", body = JobRunResponse),
        (status = 500, description = "Users could not be loaded")
    )
)]
pub async fn late_reminder_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<JobRunResponse>, (StatusCode, String)> {
    run_job(&app_state, ReminderJob::LateReminder).await
}

/// List every user record. Only mounted when `EXPOSE_USER_LIST` is set.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 500, description = "Users could not be loaded")
    )
)]
pub async fn list_users_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, (StatusCode, String)> {
    match app_state.store.list_users().await {
        Ok(users) => Ok(Json(users.into_iter().map(UserResponse::from).collect())),
        Err(e) => {
            error!("Failed to list users: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list users".to_string(),
            ))
        }
    }
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_tracker_core::{StudyDay, UserStatus};

    #[test]
    fn job_response_uses_job_names_and_iso_days() {
        let response = JobRunResponse::from(ReminderSummary {
            job: ReminderJob::MidDayReminder,
            study_day: StudyDay::from_ymd(2024, 6, 10).unwrap(),
            notified: 4,
        });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "job": "midday_reminder", "study_day": "2024-06-10", "notified": 4 })
        );
    }

    #[test]
    fn user_response_keys_days_by_iso_date() {
        let day = StudyDay::from_ymd(2024, 6, 10).unwrap();
        let mut user = UserRecord::awaiting_target("U1");
        user.status = UserStatus::Active;
        user.daily_target = Some(3);
        user.report.insert(day, vec![1, 2]);
        user.rest.insert(day, true);

        assert_eq!(
            serde_json::to_value(UserResponse::from(user)).unwrap(),
            serde_json::json!({
                "user_id": "U1",
                "status": "ACTIVE",
                "daily_target": 3,
                "report": { "2024-06-10": [1, 2] },
                "rest": { "2024-06-10": true }
            })
        );
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/webhook",
            "/jobs/unchecked-notice",
            "/jobs/midday-reminder",
            "/jobs/late-reminder",
            "/users",
            "/healthz",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn hidden_user_list_is_left_out_of_the_document() {
        assert!(!api_doc(false).paths.paths.contains_key("/users"));
        assert!(api_doc(false).paths.paths.contains_key("/webhook"));
        assert!(api_doc(true).paths.paths.contains_key("/users"));
    }
}
