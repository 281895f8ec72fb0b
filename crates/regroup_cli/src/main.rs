//! CLI smoke entry point.
//!
//! # Responsibility
//! - Replay a short regrouping session against the in-process board server.
//! - Print the client cache layout after each drop for quick sanity checks.

use log::info;
use regroup_core::{
    init_logging, BoardServer, BoardService, CoreConfig, DispatchOutcome, Dispatcher, DropIntent,
    MemoryRecordStore, RecordId, TransportError,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("regroup: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    if config.logging.log_dir.is_some() {
        init_logging(&config.logging)?;
    }
    println!("regroup_core version={}", regroup_core::core_version());

    let mut server = BoardServer::new();
    let meeting = server.board().create_meeting("Sprint retro")?;
    let went_well = server
        .board()
        .create_group(&meeting.id, Some("Went well".to_string()))?;
    let to_improve = server
        .board()
        .create_group(&meeting.id, Some("To improve".to_string()))?;
    let pairing = server.board().add_reflection(&went_well.id, "pairing on bugs")?;
    let demos = server.board().add_reflection(&went_well.id, "demo day")?;
    let flaky = server.board().add_reflection(&to_improve.id, "flaky CI")?;

    let mut client = BoardService::new(server.snapshot());
    let mut dispatcher = Dispatcher::new(&config);
    print_layout("initial", &client, &meeting.id)?;

    let drops = [
        ("demo day onto its own group", DropIntent::onto_grid(demos.id.clone())),
        (
            "pairing next to flaky CI",
            DropIntent::onto_group(pairing.id.clone(), to_improve.id.clone()),
        ),
        ("cancelled drag of flaky CI", DropIntent::cancelled(flaky.id.clone())),
    ];
    for (label, intent) in drops {
        client.start_dragging(&intent.reflection_id)?;
        let outcome = dispatcher.submit(client.store_mut(), &mut server, intent)?;
        report(label, &outcome);
        print_layout(label, &client, &meeting.id)?;
    }

    server.fail_next(TransportError::Unavailable("connection reset".to_string()));
    client.start_dragging(&flaky.id)?;
    let outcome = dispatcher.submit(
        client.store_mut(),
        &mut server,
        DropIntent::onto_grid(flaky.id.clone()),
    )?;
    report("offline drop of flaky CI", &outcome);
    print_layout("after rollback", &client, &meeting.id)?;

    let converged = server.board().layout(&meeting.id)?.member_ids()
        == client.layout(&meeting.id)?.member_ids();
    println!("converged={converged}");
    info!("event=cli_replay module=cli status=ok converged={converged}");
    Ok(())
}

fn report(label: &str, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Confirmed(confirm) => println!(
            "-- {label}: confirmed purged_temp_groups={}",
            confirm.purged_temp_groups.len()
        ),
        DispatchOutcome::RolledBack {
            error,
            reverted_entries,
        } => println!("-- {label}: rolled back ({error}) reverted_entries={reverted_entries}"),
    }
}

fn print_layout(
    label: &str,
    client: &BoardService<MemoryRecordStore>,
    meeting_id: &RecordId,
) -> Result<(), Box<dyn Error>> {
    println!("== {label}");
    print!("{}", client.layout(meeting_id)?);
    Ok(())
}
