use regroup_core::relocation::temp_id::is_temporary_id;
use regroup_core::store::snapshot;
use regroup_core::store::sqlite::SqliteRecordStore;
use regroup_core::{
    open_db_in_memory, BoardServer, BoardService, CoreConfig, DispatchOutcome, Dispatcher,
    DragTransport, DropIntent, Meeting, MemoryRecordStore, OptimisticOutcome, Reflection,
    ReflectionGroup, RecordStore, SortNoise, TempIdAllocator, TransportError,
};

struct Board {
    server: BoardServer,
    meeting: Meeting,
    went_well: ReflectionGroup,
    to_improve: ReflectionGroup,
    pairing: Reflection,
    demos: Reflection,
    flaky: Reflection,
}

/// Went well [pairing, demos], To improve [flaky].
fn board() -> Board {
    let mut server = BoardServer::new();
    let meeting = server.board().create_meeting("Sprint retro").unwrap();
    let went_well = server
        .board()
        .create_group(&meeting.id, Some("Went well".to_string()))
        .unwrap();
    let to_improve = server
        .board()
        .create_group(&meeting.id, Some("To improve".to_string()))
        .unwrap();
    let pairing = server.board().add_reflection(&went_well.id, "pairing").unwrap();
    let demos = server.board().add_reflection(&went_well.id, "demo day").unwrap();
    let flaky = server.board().add_reflection(&to_improve.id, "flaky CI").unwrap();
    Board {
        server,
        meeting,
        went_well,
        to_improve,
        pairing,
        demos,
        flaky,
    }
}

fn dispatcher() -> Dispatcher {
    Dispatcher::with_sources(
        TempIdAllocator::new("client:"),
        SortNoise::seeded(1e-6, 42),
    )
}

fn assert_converged<S: RecordStore>(board: &mut Board, client: &BoardService<S>) {
    let server_layout = board.server.board().layout(&board.meeting.id).unwrap();
    let client_layout = client.layout(&board.meeting.id).unwrap();
    assert_eq!(client_layout.member_ids(), server_layout.member_ids());
    for group in &client_layout.groups {
        assert!(!is_temporary_id(&group.group.id, "client:"));
    }
}

#[test]
fn confirmed_solo_drop_replaces_temporary_group() {
    let mut board = board();
    let mut client = BoardService::new(board.server.snapshot());
    let mut dispatcher = dispatcher();

    client.start_dragging(&board.demos.id).unwrap();
    let outcome = dispatcher
        .submit(
            client.store_mut(),
            &mut board.server,
            DropIntent::onto_grid(board.demos.id.clone()).with_drag_id("drag-1"),
        )
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Confirmed(_)));
    assert_converged(&mut board, &client);
    assert!(snapshot(client.store())
        .unwrap()
        .keys()
        .all(|id| !is_temporary_id(id, "client:")));

    let demos = client.reflection(&board.demos.id).unwrap().unwrap();
    assert!(demos.is_dropping);
    assert!(!demos.is_viewer_dragging);
    assert_eq!(demos.sort_order, 0.0);
}

#[test]
fn confirmed_group_drop_takes_server_sort_key() {
    let mut board = board();
    let mut client = BoardService::new(board.server.snapshot());
    let mut dispatcher = dispatcher();

    dispatcher
        .submit(
            client.store_mut(),
            &mut board.server,
            DropIntent::onto_group(board.flaky.id.clone(), board.went_well.id.clone()),
        )
        .unwrap();

    let flaky = client.reflection(&board.flaky.id).unwrap().unwrap();
    assert_eq!(flaky.sort_order, 2.0);
    assert_eq!(
        client.group_members(&board.went_well.id).unwrap().last().map(|r| r.id.clone()),
        Some(board.flaky.id.clone())
    );
    let retired = client.group(&board.to_improve.id).unwrap().unwrap();
    assert!(!retired.is_active);
    assert_converged(&mut board, &client);
}

#[test]
fn transport_failure_restores_pre_drop_state() {
    let mut board = board();
    let mut client = BoardService::new(board.server.snapshot());
    let mut dispatcher = dispatcher();
    client.start_dragging(&board.flaky.id).unwrap();
    let before = client.store().clone();

    board
        .server
        .fail_next(TransportError::Unavailable("connection reset".to_string()));
    let outcome = dispatcher
        .submit(
            client.store_mut(),
            &mut board.server,
            DropIntent::onto_grid(board.flaky.id.clone()),
        )
        .unwrap();

    match outcome {
        DispatchOutcome::RolledBack {
            error,
            reverted_entries,
        } => {
            assert_eq!(error.code(), "server_unavailable");
            assert!(reverted_entries > 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(client.store(), &before);
}

#[test]
fn rejected_drop_rolls_back_too() {
    let mut board = board();
    let mut client = BoardService::new(board.server.snapshot());
    let before = client.store().clone();

    // The server never heard of this group, the client cache has it.
    let stray = client
        .create_group(&board.meeting.id, Some("local only".to_string()))
        .unwrap();
    let with_stray = client.store().clone();
    assert_ne!(with_stray, before);

    let outcome = dispatcher()
        .submit(
            client.store_mut(),
            &mut board.server,
            DropIntent::onto_group(board.pairing.id.clone(), stray.id),
        )
        .unwrap();

    assert!(matches!(
        outcome,
        DispatchOutcome::RolledBack {
            error: TransportError::Rejected(_),
            ..
        }
    ));
    assert_eq!(client.store(), &with_stray);
}

#[test]
fn acknowledgement_flag_survives_revert_and_fires_once() {
    let mut board = board();
    let mut client: MemoryRecordStore = board.server.snapshot();
    let mut dispatcher = dispatcher();
    let intent = DropIntent::onto_group(board.pairing.id.clone(), board.to_improve.id.clone());

    let mut pending = dispatcher.begin(&mut client, intent.clone()).unwrap();
    assert!(matches!(
        pending.optimistic(),
        OptimisticOutcome::Relocated { fabricated: false, .. }
    ));

    let response = board.server.end_dragging(&intent).unwrap();
    assert!(pending.acknowledge(&mut client, &response.acknowledgement).unwrap());
    assert!(!pending.acknowledge(&mut client, &response.acknowledgement).unwrap());
    assert!(pending.is_acknowledged());

    let confirm = pending.complete(&mut client, &response.payload).unwrap();
    assert!(confirm.purged_temp_groups.is_empty());

    let service = BoardService::new(client);
    let pairing = service.reflection(&board.pairing.id).unwrap().unwrap();
    assert!(pairing.is_dropping);
    assert_eq!(pairing.reflection_group_id, Some(board.to_improve.id.clone()));
    assert_eq!(
        service
            .group_members(&board.to_improve.id)
            .unwrap()
            .into_iter()
            .map(|reflection| reflection.id)
            .collect::<Vec<_>>(),
        vec![board.flaky.id.clone(), board.pairing.id.clone()]
    );
}

#[test]
fn sqlite_cache_follows_the_same_protocol() {
    let mut board = board();
    let conn = open_db_in_memory().unwrap();
    let mut store = SqliteRecordStore::try_new(&conn).unwrap();
    for (_, record) in snapshot(&board.server.snapshot()).unwrap() {
        store.insert(record).unwrap();
    }
    let mut client = BoardService::new(store);
    let mut dispatcher = Dispatcher::new(&CoreConfig::default());

    for intent in [
        DropIntent::onto_grid(board.demos.id.clone()),
        DropIntent::onto_group(board.pairing.id.clone(), board.to_improve.id.clone()),
        DropIntent::cancelled(board.flaky.id.clone()),
    ] {
        let outcome = dispatcher
            .submit(client.store_mut(), &mut board.server, intent)
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Confirmed(_)));
    }

    assert_converged(&mut board, &client);
    let retired = client.group(&board.went_well.id).unwrap().unwrap();
    assert!(!retired.is_active);
}

/// Demos dropped onto the grid while flaky is dropped into Went well; both
/// optimistic passes run before the server answers either.
fn overlapping_drops(board: &Board) -> (DropIntent, DropIntent) {
    (
        DropIntent::onto_grid(board.demos.id.clone()),
        DropIntent::onto_group(board.flaky.id.clone(), board.went_well.id.clone()),
    )
}

#[test]
fn overlapping_drops_converge_when_both_confirm() {
    let mut board = board();
    let mut client = BoardService::new(board.server.snapshot());
    let mut dispatcher = dispatcher();
    let (solo, into_group) = overlapping_drops(&board);

    let first = dispatcher.begin(client.store_mut(), solo.clone()).unwrap();
    let second = dispatcher.begin(client.store_mut(), into_group.clone()).unwrap();
    let first_response = board.server.end_dragging(&solo).unwrap();
    let second_response = board.server.end_dragging(&into_group).unwrap();

    first.complete(client.store_mut(), &first_response.payload).unwrap();
    second.complete(client.store_mut(), &second_response.payload).unwrap();

    assert_converged(&mut board, &client);
    let layout = client.layout(&board.meeting.id).unwrap();
    assert_eq!(layout.groups.len(), 2);
    assert_eq!(
        layout.member_ids()[0],
        (
            board.went_well.id.clone(),
            vec![board.pairing.id.clone(), board.flaky.id.clone()]
        )
    );
}

#[test]
fn overlapping_drops_converge_when_resolved_out_of_order() {
    let mut board = board();
    let mut client = BoardService::new(board.server.snapshot());
    let mut dispatcher = dispatcher();
    let (solo, into_group) = overlapping_drops(&board);

    let first = dispatcher.begin(client.store_mut(), solo.clone()).unwrap();
    let second = dispatcher.begin(client.store_mut(), into_group.clone()).unwrap();
    let first_response = board.server.end_dragging(&solo).unwrap();
    let second_response = board.server.end_dragging(&into_group).unwrap();

    second.complete(client.store_mut(), &second_response.payload).unwrap();
    first.complete(client.store_mut(), &first_response.payload).unwrap();

    assert_converged(&mut board, &client);
}

#[test]
fn failed_drop_does_not_undo_overlapping_confirmed_drop() {
    let mut board = board();
    let mut client = BoardService::new(board.server.snapshot());
    let mut dispatcher = dispatcher();
    let (solo, into_group) = overlapping_drops(&board);

    let first = dispatcher.begin(client.store_mut(), solo.clone()).unwrap();
    let second = dispatcher.begin(client.store_mut(), into_group.clone()).unwrap();
    let first_response = board.server.end_dragging(&solo).unwrap();
    board
        .server
        .fail_next(TransportError::Unavailable("connection reset".to_string()));
    let error = board.server.end_dragging(&into_group).unwrap_err();

    first.complete(client.store_mut(), &first_response.payload).unwrap();
    assert!(second.fail(client.store_mut(), &error).unwrap() > 0);

    assert_converged(&mut board, &client);
    let to_improve = client.group(&board.to_improve.id).unwrap().unwrap();
    assert!(to_improve.is_active);
    assert_eq!(to_improve.reflection_ids, vec![board.flaky.id.clone()]);
    assert_eq!(client.layout(&board.meeting.id).unwrap().groups.len(), 3);
}
