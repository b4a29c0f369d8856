//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `taskflow_core` linkage and that the bundled schema migrates.
//! - Keep output deterministic for quick local sanity checks.

use std::process::ExitCode;
use taskflow_core::db::migrations::{latest_version, schema_version};

fn main() -> ExitCode {
    println!("taskflow_core ping={}", taskflow_core::ping());
    println!("taskflow_core version={}", taskflow_core::core_version());

    let probe = taskflow_core::open_db_in_memory()
        .and_then(|conn| schema_version(&conn));
    match probe {
        Ok(version) => {
            println!("taskflow_core schema_version={version} latest={}", latest_version());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("taskflow_core store probe failed: {err}");
            ExitCode::FAILURE
        }
    }
}
