use pact_core::util::now_millis;

use crate::commands::common::{format_optional_time, open_session, print_json, SessionArgs};
use crate::error::CliError;

pub async fn run_metrics_show(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let metrics = session.metrics().await?;

    if as_json {
        return print_json(&metrics);
    }
    println!("total syncs:        {}", metrics.total_syncs);
    println!("successful syncs:   {}", metrics.successful_syncs);
    println!("failed syncs:       {}", metrics.failed_syncs);
    println!("bytes transferred:  {}", metrics.bytes_transferred);
    println!("conflicts resolved: {}", metrics.conflicts_resolved);
    println!(
        "last success:       {}",
        format_optional_time(metrics.last_successful_sync, now_millis())
    );
    println!("reliability:        {:.0}%", metrics.reliability_score);
    Ok(())
}

pub async fn run_metrics_reset(args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    session.reset_metrics().await?;
    println!("Sync metrics reset");
    Ok(())
}
