use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use backoffice_core::clock::{Clock, ManualClock, SystemClock};
use backoffice_core::config::AppConfig;
use backoffice_core::domain::ticket::TicketView;
use backoffice_db::{Services, TracingAuditSink};

use crate::commands::{open_database, prepare, CommandResult};

#[derive(Debug, Serialize)]
pub struct BreachRow {
    pub number: u64,
    pub title: String,
    pub category_id: String,
    pub priority: String,
    pub status: String,
    pub resolution_deadline: DateTime<Utc>,
    pub hours_overdue: i64,
}

impl BreachRow {
    fn from_view(view: &TicketView) -> Self {
        let ticket = &view.ticket;
        let deadline = ticket.sla().resolution_deadline;
        Self {
            number: ticket.number,
            title: ticket.title.clone(),
            category_id: ticket.category_id.0.clone(),
            priority: ticket.priority.to_string(),
            status: ticket.status().to_string(),
            resolution_deadline: deadline,
            hours_overdue: (view.evaluated_at - deadline).num_hours(),
        }
    }
}

/// Lists tickets past their resolution deadline, evaluated at `at` or now.
pub fn run(at: Option<DateTime<Utc>>) -> CommandResult {
    let (config, runtime) = match prepare("breaches") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let rows = load_breaches(pool.clone(), &config, at)
            .await
            .map_err(|error| ("breach_query", format!("{error:#}"), 5u8))?;
        pool.close().await;
        Ok::<Vec<BreachRow>, (&'static str, String, u8)>(rows)
    });

    match result {
        Ok(rows) => {
            let message = format!("{} ticket(s) past resolution deadline", rows.len());
            match serde_json::to_value(&rows) {
                Ok(data) => CommandResult::success_with_data("breaches", message, Some(data)),
                Err(error) => {
                    CommandResult::failure("breaches", "serialization", error.to_string(), 7)
                }
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("breaches", error_class, message, exit_code)
        }
    }
}

async fn load_breaches(
    pool: backoffice_db::DbPool,
    config: &AppConfig,
    at: Option<DateTime<Utc>>,
) -> anyhow::Result<Vec<BreachRow>> {
    let clock: Arc<dyn Clock> = match at {
        Some(instant) => Arc::new(ManualClock::new(instant)),
        None => Arc::new(SystemClock),
    };
    let services = Services::sqlite(pool, config, clock, Arc::new(TracingAuditSink));

    let breached = services
        .tickets
        .list_breached()
        .await
        .context("failed to list tickets past their resolution deadline")?;

    tracing::info!(
        event_name = "cli.breaches.listed",
        correlation_id = "cli-breaches",
        breached = breached.len(),
        "breach report generated"
    );

    Ok(breached.iter().map(BreachRow::from_view).collect())
}
