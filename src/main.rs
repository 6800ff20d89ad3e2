use anyhow::{Context, Result};
use chrono::Utc;
use ci_dashboard::api_types::LoginPayload;
use ci_dashboard::auth_api;
use ci_dashboard::config::Config;
use ci_dashboard::format::{format_date, format_duration, format_relative_time};
use ci_dashboard::models::DashboardState;
use ci_dashboard::state::AppState;
use tracing::{info, warn};

fn report(state: &DashboardState) {
    if state.loading {
        return;
    }
    if let Some(err) = &state.error {
        warn!("Dashboard error: {}", err);
        return;
    }
    let now = Utc::now();
    let updated = state.last_updated.map(|t| t.to_rfc3339());
    info!(
        "{} successful / {} active / {} failed, avg build {} (updated {})",
        state.metrics.successful,
        state.metrics.active,
        state.metrics.failed,
        format_duration(Some(state.metrics.avg_build_time)),
        format_date(updated.as_deref()),
    );
    for p in &state.pipelines {
        info!(
            "  [{}] {} ({}) last run {}, took {}",
            p.status.as_str(),
            p.name,
            p.owner,
            format_relative_time(p.last_run.as_deref(), now),
            format_duration(p.duration_minutes),
        );
    }
    for log in state.logs.iter().take(5) {
        info!("  log {:?}: {}", log.level, log.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::new().context("Failed to load config")?;
    if config.api.use_mock {
        info!("Using in-memory mock API");
    } else {
        info!("Using API at {}", config.api.base_url);
    }

    let state = AppState::build(config).await?;
    state.auth.initialize().await?;

    if !state.auth.is_authenticated() {
        let creds = &state.config.auth;
        match (&creds.username, &creds.password) {
            (Some(username), Some(password)) => {
                let payload = LoginPayload {
                    username: username.clone(),
                    password: password.clone(),
                    totp_code: creds.totp_code.clone(),
                };
                if let Err(e) = auth_api::sign_in(&state.client, &state.auth, &payload).await {
                    warn!("Startup sign-in failed: {}", e);
                }
            }
            _ => warn!("No stored session and no credentials configured; waiting for a login"),
        }
    }

    let auth_watcher = state.dashboard.follow_auth();
    if state.auth.is_authenticated() {
        state.dashboard.start();
    }

    let mut updates = state.dashboard.subscribe();
    let reporter = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            report(&snapshot);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    state.dashboard.stop();
    auth_watcher.abort();
    reporter.abort();
    state.storage.close().await;

    Ok(())
}
