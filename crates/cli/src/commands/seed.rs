use std::sync::Arc;

use backoffice_core::audit::AuditContext;
use backoffice_core::clock::SystemClock;
use backoffice_db::{DemoDataset, SeedResult, Services, TracingAuditSink};

use crate::commands::{describe_failure, open_database, prepare, CommandError, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let services = Services::sqlite(
            pool.clone(),
            &config,
            Arc::new(SystemClock),
            Arc::new(TracingAuditSink),
        );
        let context = AuditContext::system("cli-seed");

        let seed_result = DemoDataset::load(&services, &context)
            .await
            .map_err(|error| ("seed_execution", describe_failure(error, "cli-seed"), 5u8))?;

        let verification = DemoDataset::verify(&services)
            .await
            .map_err(|error| ("seed_verification", describe_failure(error, "cli-seed"), 6u8))?;

        let run_result: Result<SeedResult, CommandError> = if verification.all_present {
            Ok(seed_result)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    if seeded.skipped {
        return "demo dataset already present; nothing seeded".to_string();
    }
    format!(
        "demo dataset loaded: categories [{}], tickets [{}], requisitions [{}]",
        seeded.categories.join(", "),
        seeded.tickets.iter().map(|number| format!("#{number}")).collect::<Vec<_>>().join(", "),
        seeded.requisitions.join(", ")
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
