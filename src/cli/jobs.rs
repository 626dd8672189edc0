use anyhow::Result;
use chrono::DateTime;

use crate::config::Config;

use super::open_store;

fn format_ts(ts: Option<i64>) -> String {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub async fn show_job(job_id: i64, project: String) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let store = open_store(&project, &config)?;

    let Some(job) = store.get_job(job_id)? else {
        println!("Job {} not found", job_id);
        return Ok(());
    };

    println!("Job {}", job.id);
    println!("Repository: {}", job.repository_id);
    println!("Ref: {}", job.git_ref);
    if let Some(sha) = &job.commit_sha {
        println!("Commit: {}", sha);
    }
    println!("Status: {}", job.status.as_str());
    println!("Retries: {}", job.retry_count);
    println!("Created: {}", format_ts(Some(job.created_at)));
    println!("Started: {}", format_ts(job.started_at));
    println!("Completed: {}", format_ts(job.completed_at));

    if let Some(error) = &job.error_message {
        println!("Error: {}", error);
    }
    if let Some(stats) = &job.stats {
        println!("Stats:");
        println!("  files indexed: {}", stats.files_indexed);
        println!("  symbols extracted: {}", stats.symbols_extracted);
        println!("  references found: {}", stats.references_found);
        println!("  dependencies extracted: {}", stats.dependencies_extracted);
        if stats.files_skipped > 0 {
            println!("  files skipped: {}", stats.files_skipped);
        }
        if !stats.parse_errors.is_empty() {
            println!("  parse errors: {}", stats.parse_errors.len());
        }
    }

    Ok(())
}
