use pact_core::util::{compact_text, now_millis};

use crate::cli::OperationKindArg;
use crate::commands::common::{
    format_relative_time, open_remote_session, open_session, parse_json_data, print_json,
    SessionArgs,
};
use crate::error::CliError;

pub async fn run_enqueue(
    kind: OperationKindArg,
    collection: &str,
    record_id: &str,
    data: &str,
    args: &SessionArgs,
) -> Result<(), CliError> {
    let data = parse_json_data(data)?;
    let session = open_session(args).await?;
    let queued = session
        .record_mutation(kind.into(), collection, record_id, data)
        .await?;
    println!(
        "Queued {} #{} for {}/{}",
        queued.kind, queued.id, queued.owner_id, queued.collection
    );
    Ok(())
}

pub async fn run_queue(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let pending = session.queue().pending().await?;

    if as_json {
        return print_json(&pending);
    }
    if pending.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    let now = now_millis();
    for operation in &pending {
        println!(
            "#{:<6} {:<6} {}/{} retries={} {} {}",
            operation.id,
            operation.kind,
            operation.owner_id,
            operation.collection,
            operation.retry_count,
            format_relative_time(operation.created_at, now),
            compact_text(&operation.payload.to_string())
        );
    }
    Ok(())
}

pub async fn run_flush(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_remote_session(args).await?;
    let report = session.flush().await?;

    if as_json {
        return print_json(&report);
    }
    println!(
        "Flushed queue: {} confirmed, {} still pending, {} dropped",
        report.removed(),
        report.failed(),
        report.dropped()
    );
    let divergences = report.divergences().len();
    if divergences > 0 {
        println!("{divergences} conflict(s) detected");
    }
    for scope in report.scopes.iter().filter(|scope| scope.error.is_some()) {
        println!(
            "  {}/{}: {} (retry {})",
            scope.scope.owner_id,
            scope.scope.collection,
            scope.error.as_deref().unwrap_or_default(),
            scope.retry_count
        );
    }
    Ok(())
}
