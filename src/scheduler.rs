//! Cron-driven generation trigger.
//!
//! A ticker wakes every second, checks whether the next cron fire time has
//! passed, and runs one `GenerationJob` when it has. Runs never overlap: the
//! next fire time is computed after the current run finishes.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::pipeline::GenerationJob;

/// How often the ticker checks the schedule.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

fn parse_schedule(schedule: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(schedule).map_err(|e| ConfigError::InvalidValue {
        key: "DIALOGUE_SCHEDULE".into(),
        message: format!("invalid cron: {e}"),
    })
}

/// Next fire time of a cron expression after now.
pub fn next_fire(schedule: &str) -> Result<Option<DateTime<Utc>>, ConfigError> {
    Ok(parse_schedule(schedule)?.upcoming(Utc).next())
}

/// Spawn a background task that runs `job` on `schedule`.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_generation_ticker(
    job: Arc<GenerationJob>,
    schedule: &str,
) -> Result<(JoinHandle<()>, Arc<AtomicBool>), ConfigError> {
    let schedule = parse_schedule(schedule)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        let mut next = schedule.upcoming(Utc).next();
        match next {
            Some(at) => info!(next_fire = %at, "Generation ticker started"),
            None => warn!("Schedule has no upcoming fire time, ticker idle"),
        }

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Generation ticker shutting down");
                return;
            }

            let Some(due) = next else { continue };
            if Utc::now() < due {
                continue;
            }

            match job.run_once().await {
                Ok(summary) => info!(
                    conversation_id = %summary.conversation_id,
                    persisted = summary.persisted,
                    orphaned = summary.orphaned.len(),
                    "Scheduled generation complete"
                ),
                Err(e) => error!(error = %e, "Scheduled generation failed"),
            }
            next = schedule.upcoming(Utc).next();
        }
    });

    Ok((handle, shutdown_flag))
}
