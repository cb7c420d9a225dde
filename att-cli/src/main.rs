//! att: command line client for the Arcade Time Tracker
//!
//! Session lifecycle commands (`start`, `track`, `untrack`) go through the local
//! `attd` daemon so it can schedule reminders. Read-only queries and
//! `pause`/`cancel` talk to the time tracking service directly.

mod credentials;

use anyhow::Context;
use attd_core::client::send_command;
use attd_core::config::{DEFAULT_API_BASE_URL, DEFAULT_SOCKET_PATH};
use attd_core::{Command, HackHourClient, RawResponse};
use clap::{Parser, Subcommand};
use credentials::{Credentials, API_TOKEN_KEY, SLACK_ID_KEY};
use std::io::{BufRead, Write};
use tracing_subscriber::{fmt, EnvFilter};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MISSING_CREDENTIALS: &str =
    "Please set your API token and Slack ID using the configure command.";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "att", version, about = "Arcade Time Tracker")]
struct Cli {
    /// Path of the attd socket
    #[arg(long = "pipe-path", env = "ATTD_PIPE_PATH", default_value = DEFAULT_SOCKET_PATH)]
    pipe_path: String,

    /// Time tracking service URL
    #[arg(long, env = "ATT_SERVER_URL", default_value = DEFAULT_API_BASE_URL)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Store credentials locally
    Configure {
        #[command(subcommand)]
        setting: Setting,
    },

    #[command(flatten)]
    Tracker(TrackerCommand),
}

/// Commands that need stored credentials.
#[derive(Debug, Subcommand)]
enum TrackerCommand {
    /// Start a new session through the daemon
    Start {
        /// What you are working on; prompted for when omitted
        work: Option<String>,
    },

    /// Schedule reminders for the current session
    Track,

    /// Stop all reminders for your Slack ID
    Untrack,

    /// Query or control sessions on the time tracking service
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Debug, Subcommand)]
enum Setting {
    /// Set the API token
    ApiToken { token: String },
    /// Set the Slack ID
    SlackId { id: String },
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum SessionAction {
    /// Show the latest session
    List,
    /// Show stats for the user
    Stats,
    /// Show goals for the user
    Goals,
    /// Show session history
    History,
    /// Pause or resume the current session
    Pause,
    /// Cancel the current session and its reminders
    Cancel,
}

impl SessionAction {
    fn endpoint(self) -> &'static str {
        match self {
            SessionAction::List => "session",
            SessionAction::Stats => "stats",
            SessionAction::Goals => "goals",
            SessionAction::History => "history",
            SessionAction::Pause => "pause",
            SessionAction::Cancel => "cancel",
        }
    }

    fn is_query(self) -> bool {
        !matches!(self, SessionAction::Pause | SessionAction::Cancel)
    }
}

// ============================================================================
// Output
// ============================================================================

/// Render a service response for the terminal: the pretty-printed `data` object
/// when `ok`, otherwise a single error line.
fn render_response(raw: &RawResponse) -> String {
    let value: serde_json::Value = match serde_json::from_str(&raw.body) {
        Ok(v) => v,
        Err(_) => return format!("Error: received {} with body: {}", raw.status, raw.body),
    };

    if value["ok"].as_bool() == Some(true) {
        serde_json::to_string_pretty(&value["data"]).unwrap_or_default()
    } else {
        let message = value["error"].as_str().unwrap_or("unable to fetch data");
        format!("Error: {}", message)
    }
}

// ============================================================================
// Commands
// ============================================================================

fn configure(setting: Setting) -> anyhow::Result<()> {
    let mut creds = Credentials::load(Credentials::default_path())?;
    match setting {
        Setting::ApiToken { token } => creds.set(API_TOKEN_KEY, &token),
        Setting::SlackId { id } => creds.set(SLACK_ID_KEY, &id),
    }
    creds.save()?;
    println!("Configuration data saved successfully.");
    Ok(())
}

fn prompt_work() -> anyhow::Result<String> {
    print!("Session Description: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn send_to_daemon(pipe_path: &str, command: &Command) -> anyhow::Result<String> {
    tracing::debug!(command = command.name(), pipe_path, "Sending command to daemon");
    send_command(pipe_path, command)
        .await
        .with_context(|| format!("Unable to reach attd at {} (is the daemon running?)", pipe_path))
}

async fn session(
    client: &HackHourClient,
    action: SessionAction,
    slack_id: &str,
    api_key: &str,
) -> anyhow::Result<String> {
    tracing::debug!(endpoint = action.endpoint(), "Calling time tracking service");
    let raw = if action.is_query() {
        client.get_resource(action.endpoint(), slack_id, api_key).await?
    } else {
        client.post_action(action.endpoint(), slack_id, api_key).await?
    };
    Ok(render_response(&raw))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = match cli.command {
        Commands::Configure { setting } => return configure(setting),
        Commands::Tracker(command) => command,
    };

    let creds = Credentials::load(Credentials::default_path())?;
    let Some((slack_id, api_key)) = creds.identity() else {
        println!("{}", MISSING_CREDENTIALS);
        return Ok(());
    };

    match command {
        TrackerCommand::Start { work } => {
            let work = match work {
                Some(w) => w,
                None => prompt_work()?,
            };
            let command = Command::Start {
                work,
                slack_id: slack_id.to_string(),
                api_key: api_key.to_string(),
            };
            print!("{}", send_to_daemon(&cli.pipe_path, &command).await?);
        }
        TrackerCommand::Track => {
            let command = Command::Track {
                slack_id: slack_id.to_string(),
                api_key: api_key.to_string(),
            };
            print!("{}", send_to_daemon(&cli.pipe_path, &command).await?);
        }
        TrackerCommand::Untrack => {
            let command = Command::Untrack {
                slack_id: slack_id.to_string(),
            };
            print!("{}", send_to_daemon(&cli.pipe_path, &command).await?);
        }
        TrackerCommand::Session { action } => {
            let client = HackHourClient::with_base_url(cli.server.clone(), REQUEST_TIMEOUT_SECS)?;
            println!("{}", session(&client, action, slack_id, api_key).await?);

            if matches!(action, SessionAction::Cancel) {
                let command = Command::Untrack {
                    slack_id: slack_id.to_string(),
                };
                // Reminders are best effort; the cancel already went through
                match send_command(&cli.pipe_path, &command).await {
                    Ok(reply) => print!("{}", reply),
                    Err(e) => eprintln!("att: reminders not stopped: {}", e),
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Quiet by default; stdout belongs to command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(e) = run(cli).await {
        eprintln!("att: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn raw(status: &str, body: &str) -> RawResponse {
        RawResponse {
            status: status.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_render_ok_prints_data() {
        let out = render_response(&raw("200 OK", r#"{"ok":true,"data":{"sessions":3}}"#));
        assert_eq!(out, "{\n  \"sessions\": 3\n}");
    }

    #[test]
    fn test_render_not_ok_prints_error() {
        let out = render_response(&raw("401 Unauthorized", r#"{"ok":false,"error":"Unauthorized"}"#));
        assert_eq!(out, "Error: Unauthorized");

        let out = render_response(&raw("500 Internal Server Error", r#"{"ok":false}"#));
        assert_eq!(out, "Error: unable to fetch data");
    }

    #[test]
    fn test_render_non_json() {
        let out = render_response(&raw("502 Bad Gateway", "<html>"));
        assert_eq!(out, "Error: received 502 Bad Gateway with body: <html>");
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(SessionAction::List.endpoint(), "session");
        assert_eq!(SessionAction::History.endpoint(), "history");
        assert!(SessionAction::Goals.is_query());
        assert!(!SessionAction::Cancel.is_query());
    }

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from(["att", "--pipe-path", "/tmp/x", "session", "stats"]).unwrap();
        assert_eq!(cli.pipe_path, "/tmp/x");
        assert!(matches!(
            cli.command,
            Commands::Tracker(TrackerCommand::Session {
                action: SessionAction::Stats
            })
        ));

        let cli = Cli::try_parse_from(["att", "configure", "slack-id", "U1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Configure {
                setting: Setting::SlackId { .. }
            }
        ));

        let cli = Cli::try_parse_from(["att", "start"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Tracker(TrackerCommand::Start { work: None })
        ));
    }

    #[tokio::test]
    async fn test_session_query_uses_get() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stats/U1"))
            .and(header("authorization", "Bearer k"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"ok":true,"data":{"total":12}}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HackHourClient::with_base_url(mock_server.uri(), 5).unwrap();
        let out = session(&client, SessionAction::Stats, "U1", "k").await.unwrap();
        assert_eq!(out, "{\n  \"total\": 12\n}");
    }

    #[tokio::test]
    async fn test_session_action_uses_post() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pause/U1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"ok":true,"data":{"paused":true}}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HackHourClient::with_base_url(mock_server.uri(), 5).unwrap();
        let out = session(&client, SessionAction::Pause, "U1", "k").await.unwrap();
        assert_eq!(out, "{\n  \"paused\": true\n}");
    }
}
