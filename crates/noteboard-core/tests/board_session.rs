use kurbo::Point;
use noteboard_core::api::Saved;
use noteboard_core::{
    BoardSession, MemoryApi, PointerEvent, PointerTarget, RichDoc, SyncAdapter, TileId, TileRecord,
};
use pollster::block_on;
use std::sync::Arc;

fn record(id: &str, x: f64, related: &[&str]) -> TileRecord {
    TileRecord {
        id: id.to_string(),
        x,
        y: 0.0,
        width: 300.0,
        height: 200.0,
        name: RichDoc::plain_text(id),
        content: RichDoc::default(),
        related_ids: related.iter().map(|s| s.to_string()).collect(),
    }
}

fn setup() -> (Arc<MemoryApi>, SyncAdapter<MemoryApi>, BoardSession) {
    let api = Arc::new(MemoryApi::new());
    api.seed(
        "board",
        [record("a", 0.0, &["b"]), record("b", 600.0, &["a"]), record("c", 0.0, &[])],
    )
    .unwrap();
    api.seed("other", [record("z", 0.0, &[])]).unwrap();
    let sync = SyncAdapter::new(api.clone());
    let mut session = BoardSession::default();
    assert!(block_on(session.open_board(&sync, "board")).unwrap());
    (api, sync, session)
}

fn drag(session: &mut BoardSession, tile: &str, by: (f64, f64)) {
    session.handle_pointer(PointerEvent::Down {
        position: Point::ZERO,
        target: PointerTarget::Tile(TileId::from(tile)),
        button: Default::default(),
    });
    session.handle_pointer(PointerEvent::Move {
        position: Point::new(by.0, by.1),
    });
    session.handle_pointer(PointerEvent::Up {
        position: Point::new(by.0, by.1),
    });
}

#[test]
fn test_drag_then_save_sends_only_position() {
    let (api, sync, mut session) = setup();
    let zoom = session.camera().zoom;
    drag(&mut session, "c", (50.0, 0.0));

    let report = block_on(session.save(&sync));
    assert!(report.is_success());
    assert_eq!(report.saved, 1);

    let log = api.patch_log();
    assert_eq!(log.len(), 1);
    let (id, fields) = &log[0];
    assert_eq!(id, "c");
    assert_eq!(fields.x, Some((50.0 / zoom).round()));
    assert!(fields.width.is_none() && fields.name.is_none() && fields.content.is_none());
    assert!(!session.graph().get(&TileId::from("c")).unwrap().to_be_updated());

    // nothing left to send
    assert_eq!(block_on(session.save(&sync)).saved, 0);
}

#[test]
fn test_edit_during_save_survives_acknowledgement() {
    let (api, sync, mut session) = setup();
    let a = TileId::from("a");
    session.set_tile_content(&a, RichDoc::plain_text("first"));

    let batch = session.begin_save();
    // user keeps typing while the request is in flight
    session.set_tile_content(&a, RichDoc::plain_text("second"));
    let results = block_on(sync.push(batch));
    session.finish_save(results);

    let tile = session.graph().get(&a).unwrap();
    assert!(tile.content_updated());
    assert_eq!(api.tile("a").unwrap().content, RichDoc::plain_text("first"));

    block_on(session.save(&sync));
    assert_eq!(api.tile("a").unwrap().content, RichDoc::plain_text("second"));
    assert!(!session.graph().get(&a).unwrap().to_be_updated());
}

#[test]
fn test_failed_patch_keeps_flags_for_retry() {
    let (api, sync, mut session) = setup();
    session.set_tile_content(&TileId::from("a"), RichDoc::plain_text("x"));
    session.set_tile_content(&TileId::from("c"), RichDoc::plain_text("y"));
    api.fail_patches_for("a");

    let report = block_on(session.save(&sync));
    assert_eq!(report.saved, 1);
    assert_eq!(report.failed, vec![TileId::from("a")]);
    assert!(session.graph().get(&TileId::from("a")).unwrap().content_updated());
    assert!(!session.graph().get(&TileId::from("c")).unwrap().content_updated());

    api.clear_failures();
    assert!(block_on(session.save(&sync)).is_success());
    assert!(!session.graph().get(&TileId::from("a")).unwrap().to_be_updated());
}

#[test]
fn test_new_tile_relation_reaches_server_in_two_saves() {
    let (api, sync, mut session) = setup();
    let new = session.create_tile(Point::new(0.0, 400.0), RichDoc::default(), RichDoc::default());
    session.link_tiles(&TileId::from("c"), &new).unwrap();

    // first save creates the tile; c's side waits for the server id
    let batch = session.begin_save();
    assert_eq!(batch.len(), 1);
    let results = block_on(sync.push(batch));
    let server_id = match &results.outcomes[0].result {
        Ok(Saved::Created(id)) => id.clone(),
        other => panic!("unexpected outcome {other:?}"),
    };
    session.finish_save(results);
    assert_eq!(api.tile(&server_id).unwrap().related_ids, vec!["c".to_string()]);
    assert!(session.graph().get(&TileId::from("c")).unwrap().is_pending_add(&new));

    // second save patches c with the new server id
    assert!(block_on(session.save(&sync)).is_success());
    assert_eq!(api.tile("c").unwrap().related_ids, vec![server_id]);
    assert!(!session.graph().get(&TileId::from("c")).unwrap().to_be_updated());
}

#[test]
fn test_unlink_and_remove_reach_server() {
    let (api, sync, mut session) = setup();
    let connector = session
        .graph()
        .get(&TileId::from("a"))
        .unwrap()
        .connector_to(&TileId::from("b"))
        .unwrap()
        .id();
    assert!(session.unlink(connector));
    assert!(block_on(session.save(&sync)).is_success());
    assert!(api.tile("a").unwrap().related_ids.is_empty());
    assert!(api.tile("b").unwrap().related_ids.is_empty());
}

#[test]
fn test_save_results_from_previous_board_are_discarded() {
    let (_api, sync, mut session) = setup();
    session.set_tile_content(&TileId::from("a"), RichDoc::plain_text("late"));
    let batch = session.begin_save();
    let results = block_on(sync.push(batch));

    assert!(block_on(session.open_board(&sync, "other")).unwrap());
    let report = session.finish_save(results);
    assert!(report.discarded);
    assert_eq!(session.graph().len(), 1);
    assert!(session.graph().contains(&TileId::from("z")));
    assert!(!session.graph().get(&TileId::from("z")).unwrap().to_be_updated());
}

#[test]
fn test_failed_create_is_resent_on_next_save() {
    let (api, sync, mut session) = setup();
    let new = session.create_tile(Point::new(0.0, 400.0), RichDoc::default(), RichDoc::plain_text("draft"));
    api.fail_next_creates(1);

    let report = block_on(session.save(&sync));
    assert_eq!(report.saved, 0);
    assert_eq!(report.failed, vec![new.clone()]);
    let tile = session.graph().get(&new).unwrap();
    assert!(tile.to_be_updated());
    assert!(tile.server_id().is_none());

    // no longer in flight, so the create goes out again
    let batch = session.begin_save();
    assert_eq!(batch.len(), 1);
    let report = session.finish_save(block_on(sync.push(batch)));
    assert!(report.is_success());
    assert_eq!(report.saved, 1);

    let tile = session.graph().get(&new).unwrap();
    assert_eq!(tile.server_id(), Some("tile-1"));
    assert!(!tile.to_be_updated());
    assert_eq!(api.tile("tile-1").unwrap().content, RichDoc::plain_text("draft"));
}

#[test]
fn test_link_recorded_before_failed_create_survives_retry() {
    let (api, sync, mut session) = setup();
    let c = TileId::from("c");
    let new = session.create_tile(Point::new(0.0, 400.0), RichDoc::default(), RichDoc::default());
    session.link_tiles(&c, &new).unwrap();
    api.fail_next_creates(1);

    let report = block_on(session.save(&sync));
    assert_eq!(report.failed, vec![new.clone()]);
    assert!(session.graph().get(&new).unwrap().is_pending_add(&c));
    assert!(session.graph().get(&c).unwrap().is_pending_add(&new));

    // retry creates the tile with its relation; c still waits for the id
    assert!(block_on(session.save(&sync)).is_success());
    let server_id = session.graph().get(&new).unwrap().server_id().unwrap().to_string();
    assert_eq!(api.tile(&server_id).unwrap().related_ids, vec!["c".to_string()]);
    assert!(session.graph().get(&c).unwrap().is_pending_add(&new));

    assert!(block_on(session.save(&sync)).is_success());
    assert_eq!(api.tile("c").unwrap().related_ids, vec![server_id]);
    assert!(!session.graph().get(&c).unwrap().to_be_updated());
    assert!(!session.graph().get(&new).unwrap().to_be_updated());
}
