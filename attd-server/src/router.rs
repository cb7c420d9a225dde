use attd_core::api::SessionApi;
use attd_core::ipc::{Command, Reply};
use attd_core::models::ApiEnvelope;
use attd_core::{Notifier, SessionTimes};
use chrono::Utc;
use std::sync::Arc;

use crate::subsystems::reminder::ReminderScheduler;

/// Everything a connection handler needs, shared across connections.
pub struct DaemonContext {
    pub api: Arc<dyn SessionApi>,
    pub notifier: Notifier,
    pub scheduler: ReminderScheduler,
}

/// Decode one raw request and dispatch it.
pub async fn handle_request(request: &[u8], ctx: &DaemonContext) -> Reply {
    match Command::decode(request) {
        Ok(command) => handle_command(command, ctx).await,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected request");
            Reply::Protocol(e)
        }
    }
}

pub async fn handle_command(command: Command, ctx: &DaemonContext) -> Reply {
    tracing::info!(command = command.name(), slack_id = %command.slack_id(), "Handling command");
    match command {
        Command::Start {
            work,
            slack_id,
            api_key,
        } => handle_start(&work, &slack_id, &api_key, ctx).await,
        Command::Track { slack_id, api_key } => handle_track(&slack_id, &api_key, ctx).await,
        Command::Untrack { slack_id } => {
            let stopped = ctx.scheduler.cancel(&slack_id).await;
            tracing::info!(slack_id = %slack_id, stopped, "Stopped reminder tasks");
            Reply::Untracked { stopped }
        }
    }
}

async fn handle_start(work: &str, slack_id: &str, api_key: &str, ctx: &DaemonContext) -> Reply {
    let raw = match ctx.api.start_session(work, slack_id, api_key).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(slack_id = %slack_id, error = %e, "Start session request failed");
            ctx.notifier.notify(&format!("Failed to start session: {}", e));
            return Reply::StartFailed(e.to_string());
        }
    };
    tracing::info!(slack_id = %slack_id, status = %raw.status, "API request made, sending response back to sender");

    match interpret_start(&raw.body, work) {
        StartOutcome::Started { message, times } => {
            ctx.notifier.notify(&message);
            match times {
                Some(times) => {
                    ctx.scheduler.schedule(slack_id, times).await;
                }
                None => tracing::warn!(
                    slack_id = %slack_id,
                    "Session started but the response has no usable endTime; no reminders scheduled"
                ),
            }
        }
        StartOutcome::Rejected { message } | StartOutcome::Unreadable { message } => {
            ctx.notifier.notify(&message);
        }
    }

    Reply::Started {
        status: raw.status,
        body: raw.body,
    }
}

async fn handle_track(slack_id: &str, api_key: &str, ctx: &DaemonContext) -> Reply {
    match ctx.api.session_times(slack_id, api_key).await {
        Ok(times) => {
            tracing::info!(slack_id = %slack_id, created_at = %times.created_at, "Tracking started");
            ctx.scheduler.schedule(slack_id, times).await;
            Reply::Tracking {
                end_time: times.end_time,
            }
        }
        Err(e) => {
            tracing::warn!(slack_id = %slack_id, error = %e, "Failed to get session times");
            Reply::TrackFailed(e.to_string())
        }
    }
}

/// What the body of a start response means for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// `ok: true`. `times` is absent when the body carries no parseable `endTime`.
    Started {
        message: String,
        times: Option<SessionTimes>,
    },
    /// `ok: false`, with a user-facing explanation.
    Rejected { message: String },
    /// Not the service's JSON envelope; the raw text is shown as is.
    Unreadable { message: String },
}

pub fn interpret_start(body: &str, work: &str) -> StartOutcome {
    let envelope = match ApiEnvelope::parse(body) {
        Ok(envelope) => envelope,
        Err(_) => {
            let message = if body.trim().is_empty() {
                "Empty response from the time tracking service".to_string()
            } else {
                body.to_string()
            };
            return StartOutcome::Unreadable { message };
        }
    };

    if !envelope.ok {
        return StartOutcome::Rejected {
            message: friendly_error(envelope.error.as_deref()),
        };
    }

    let times = envelope.data.and_then(|data| {
        let end_time = data.end_time().ok()?;
        let created_at = data.created_at().unwrap_or_else(|_| Utc::now());
        Some(SessionTimes {
            created_at,
            end_time,
        })
    });

    StartOutcome::Started {
        message: format!("Session started: {}", work),
        times,
    }
}

/// Map the service's known error strings to friendlier notification text.
pub fn friendly_error(error: Option<&str>) -> String {
    match error {
        Some("Unauthorized") => "Unauthorized: check your API key and Slack ID".to_string(),
        Some("You already have an active session") => {
            "You already have an active session. Finish it before starting a new one.".to_string()
        }
        Some(other) => other.to_string(),
        None => "Failed to start session".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use attd_core::api::{ApiError, RawResponse};
    use attd_core::config::{OverlapPolicy, ReminderConfig};
    use attd_core::notify::MemorySink;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeApi {
        start_status: String,
        start_body: String,
        times: Option<SessionTimes>,
        calls: AtomicUsize,
    }

    impl FakeApi {
        fn starting(status: &str, body: &str) -> Self {
            Self {
                start_status: status.to_string(),
                start_body: body.to_string(),
                times: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn tracking(times: Option<SessionTimes>) -> Self {
            Self {
                times,
                ..Self::starting("200 OK", "")
            }
        }
    }

    #[async_trait]
    impl SessionApi for FakeApi {
        async fn start_session(
            &self,
            _work: &str,
            _slack_id: &str,
            _api_key: &str,
        ) -> Result<RawResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawResponse {
                status: self.start_status.clone(),
                body: self.start_body.clone(),
            })
        }

        async fn session_times(
            &self,
            _slack_id: &str,
            _api_key: &str,
        ) -> Result<SessionTimes, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.times
                .ok_or_else(|| ApiError::NotOk("No active session".to_string()))
        }
    }

    fn context(api: Arc<FakeApi>, overlap: OverlapPolicy) -> (DaemonContext, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let notifier = Notifier::new(sink.clone(), "Arcade Time Tracker");
        let config = ReminderConfig {
            overlap,
            ..ReminderConfig::default()
        };
        let ctx = DaemonContext {
            api,
            notifier: notifier.clone(),
            scheduler: ReminderScheduler::new(notifier, &config),
        };
        (ctx, sink)
    }

    fn hour_from_now() -> SessionTimes {
        let now = Utc::now();
        SessionTimes {
            created_at: now,
            end_time: now + Duration::minutes(60),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_never_calls_api() {
        let api = Arc::new(FakeApi::starting("200 OK", r#"{"ok":true}"#));
        let (ctx, sink) = context(api.clone(), OverlapPolicy::Additive);

        let reply = handle_request(
            br#"{"command":"start","data":{"work":"att","slack_id":"U1"}}"#,
            &ctx,
        )
        .await;

        assert_eq!(reply.to_string(), "Invalid or missing 'api_key' value\n");
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let api = Arc::new(FakeApi::tracking(None));
        let (ctx, _sink) = context(api.clone(), OverlapPolicy::Additive);

        let reply = handle_request(br#"{"command":"foo","data":{}}"#, &ctx).await;

        assert_eq!(reply.to_string(), "Unknown command\n");
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_success_notifies_and_schedules() {
        let times = hour_from_now();
        let body = serde_json::json!({
            "ok": true,
            "data": {
                "createdAt": times.created_at.to_rfc3339(),
                "endTime": times.end_time.to_rfc3339(),
            }
        })
        .to_string();
        let api = Arc::new(FakeApi::starting("200 OK", &body));
        let (ctx, sink) = context(api, OverlapPolicy::Additive);

        let reply = handle_command(
            Command::Start {
                work: "write docs".into(),
                slack_id: "U1".into(),
                api_key: "k".into(),
            },
            &ctx,
        )
        .await;

        assert_eq!(
            reply.to_string(),
            format!("Response Status: 200 OK\nResponse Body: {}\n", body)
        );
        assert_eq!(sink.messages()[0], "Session started: write docs");
        assert_eq!(ctx.scheduler.registry().active("U1").await, 1);
        ctx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_active_session_is_reported_once_and_not_scheduled() {
        let body = r#"{"ok":false,"error":"You already have an active session"}"#;
        let api = Arc::new(FakeApi::starting("400 Bad Request", body));
        let (ctx, sink) = context(api, OverlapPolicy::Additive);

        let reply = handle_command(
            Command::Start {
                work: "att".into(),
                slack_id: "U1".into(),
                api_key: "k".into(),
            },
            &ctx,
        )
        .await;

        assert_eq!(
            reply.to_string(),
            format!("Response Status: 400 Bad Request\nResponse Body: {}\n", body)
        );
        assert_eq!(
            sink.messages(),
            vec!["You already have an active session. Finish it before starting a new one."]
        );
        assert_eq!(ctx.scheduler.registry().total().await, 0);
    }

    #[tokio::test]
    async fn test_unparseable_start_body_is_echoed() {
        let api = Arc::new(FakeApi::starting("502 Bad Gateway", "upstream is down"));
        let (ctx, sink) = context(api, OverlapPolicy::Additive);

        handle_command(
            Command::Start {
                work: "att".into(),
                slack_id: "U1".into(),
                api_key: "k".into(),
            },
            &ctx,
        )
        .await;

        assert_eq!(sink.messages(), vec!["upstream is down"]);
        assert_eq!(ctx.scheduler.registry().total().await, 0);
    }

    #[tokio::test]
    async fn test_track_replies_with_end_time() {
        let times = hour_from_now();
        let api = Arc::new(FakeApi::tracking(Some(times)));
        let (ctx, _sink) = context(api, OverlapPolicy::Additive);

        let reply = handle_command(
            Command::Track {
                slack_id: "U1".into(),
                api_key: "k".into(),
            },
            &ctx,
        )
        .await;

        assert_eq!(
            reply,
            Reply::Tracking {
                end_time: times.end_time
            }
        );
        assert!(reply
            .to_string()
            .starts_with("Tracking started with end time: "));
        ctx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_track_failure_is_reported() {
        let api = Arc::new(FakeApi::tracking(None));
        let (ctx, _sink) = context(api, OverlapPolicy::Additive);

        let reply = handle_command(
            Command::Track {
                slack_id: "U1".into(),
                api_key: "k".into(),
            },
            &ctx,
        )
        .await;

        assert_eq!(
            reply.to_string(),
            "Failed to get session times: API response not OK: No active session\n"
        );
        assert_eq!(ctx.scheduler.registry().total().await, 0);
    }

    #[tokio::test]
    async fn test_two_tracks_run_side_by_side_then_untrack() {
        let api = Arc::new(FakeApi::tracking(Some(hour_from_now())));
        let (ctx, _sink) = context(api, OverlapPolicy::Additive);
        let track = || Command::Track {
            slack_id: "U1".into(),
            api_key: "k".into(),
        };

        handle_command(track(), &ctx).await;
        handle_command(track(), &ctx).await;
        assert_eq!(ctx.scheduler.registry().active("U1").await, 2);

        let reply = handle_command(
            Command::Untrack {
                slack_id: "U1".into(),
            },
            &ctx,
        )
        .await;
        assert_eq!(reply, Reply::Untracked { stopped: 2 });
        assert_eq!(ctx.scheduler.registry().active("U1").await, 0);
    }

    #[tokio::test]
    async fn test_replace_policy_keeps_one_task() {
        let api = Arc::new(FakeApi::tracking(Some(hour_from_now())));
        let (ctx, _sink) = context(api, OverlapPolicy::Replace);
        let track = || Command::Track {
            slack_id: "U1".into(),
            api_key: "k".into(),
        };

        handle_command(track(), &ctx).await;
        handle_command(track(), &ctx).await;
        assert_eq!(ctx.scheduler.registry().active("U1").await, 1);
        ctx.scheduler.shutdown().await;
    }

    #[test]
    fn test_friendly_errors() {
        assert_eq!(
            friendly_error(Some("Unauthorized")),
            "Unauthorized: check your API key and Slack ID"
        );
        assert_eq!(friendly_error(Some("Something else")), "Something else");
        assert_eq!(friendly_error(None), "Failed to start session");
    }

    #[test]
    fn test_started_without_end_time_schedules_nothing() {
        let outcome = interpret_start(r#"{"ok":true,"data":{}}"#, "att");
        assert_eq!(
            outcome,
            StartOutcome::Started {
                message: "Session started: att".into(),
                times: None
            }
        );
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(
            interpret_start("", "att"),
            StartOutcome::Unreadable {
                message: "Empty response from the time tracking service".into()
            }
        );
    }
}
