//! End-to-end multiplayer game over the WebSocket gateway

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;

use bulls_cows::{
    serve, AppError, ChangeEvent, GameController, Mode, RemoteStore, RoomCode, RoomStore,
    SecretCode, StoreError, StoreServer,
};

async fn start_gateway() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = StoreServer::spawn(64);
    tokio::spawn(serve(listener, store, 32));
    format!("ws://{}", addr)
}

async fn connect(url: &str) -> GameController<RemoteStore> {
    GameController::new(RemoteStore::connect(url, 32).await.unwrap())
}

/// Wait for the next event and apply it
async fn pump<S: RoomStore>(controller: &mut GameController<S>) -> ChangeEvent {
    let event = timeout(Duration::from_secs(5), controller.next_event())
        .await
        .expect("timed out waiting for a room change")
        .expect("change feed closed");
    controller.apply_event(event.clone());
    event
}

fn wrong_guess(secret: &SecretCode) -> String {
    let mut digits = *secret.digits();
    digits.reverse();
    digits.iter().map(|d| d.to_string()).collect()
}

#[tokio::test]
async fn test_two_player_game_over_gateway() {
    let url = start_gateway().await;

    let mut host = connect(&url).await;
    host.open_create_form().unwrap();
    host.create_room("Host").await.unwrap();
    let room = host.room().unwrap().clone();
    assert_eq!(room.code.as_str().len(), 6);

    let mut guest = connect(&url).await;
    guest.open_join_form().unwrap();
    guest.join_room(room.code.as_str(), "Guest").await.unwrap();
    assert_eq!(guest.players().len(), 2);

    // Host learns about the guest from the feed
    match pump(&mut host).await {
        ChangeEvent::PlayerInserted { player } => assert_eq!(player.display_name, "Guest"),
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(host.is_my_turn());

    let secret = room.secret_code;
    assert!(matches!(
        guest.submit_guess(&wrong_guess(&secret)).await,
        Err(AppError::NotYourTurn)
    ));

    host.submit_guess(&wrong_guess(&secret)).await.unwrap();

    // Guest sees the host's guess and takes the turn
    pump(&mut guest).await;
    assert!(guest.is_my_turn());

    let result = guest.submit_guess(&secret.to_string()).await.unwrap();
    assert!(result.is_win());

    // Host: own echo, guest's guess, then the winner
    loop {
        if let ChangeEvent::RoomUpdated { .. } = pump(&mut host).await {
            break;
        }
    }
    assert_eq!(host.winner().unwrap().display_name, "Guest");
    assert!(matches!(
        host.submit_guess(&secret.to_string()).await,
        Err(AppError::GameFinished)
    ));

    guest.leave().await;
    assert_eq!(guest.mode(), Mode::Home);
    loop {
        if let ChangeEvent::PlayerDeleted { .. } = pump(&mut host).await {
            break;
        }
    }
    assert_eq!(host.players().len(), 1);
}

#[tokio::test]
async fn test_join_unknown_room_over_gateway() {
    let url = start_gateway().await;

    let mut client = connect(&url).await;
    client.open_join_form().unwrap();
    assert!(matches!(
        client.join_room("100000", "Nobody").await,
        Err(AppError::RoomNotFound(_))
    ));
    assert_eq!(client.mode(), Mode::Join);
}

#[tokio::test]
async fn test_remote_store_first_winner_is_final() {
    let url = start_gateway().await;
    let store = RemoteStore::connect(&url, 32).await.unwrap();

    let room = store
        .create_room(
            RoomCode("246810".to_string()),
            "1234".parse().unwrap(),
            "Indra Thunder".to_string(),
        )
        .await
        .unwrap();
    let a = store.create_player(room.code.clone(), "A".to_string(), 0).await.unwrap();
    let b = store.create_player(room.code.clone(), "B".to_string(), 1).await.unwrap();

    store.set_room_winner(room.code.clone(), a.id).await.unwrap();
    let after = store.set_room_winner(room.code.clone(), b.id).await.unwrap();
    assert_eq!(after.winner_id, Some(a.id));

    let err = store
        .create_room(room.code.clone(), "5678".parse().unwrap(), "Agni Flame".to_string())
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::DuplicateCode(room.code));
}

#[tokio::test]
async fn test_requests_fail_fast_after_gateway_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
    });

    let store = RemoteStore::connect(&format!("ws://{}", addr), 32).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    for _ in 0..2 {
        let result = timeout(
            Duration::from_secs(3),
            store.get_room(RoomCode("123456".to_string())),
        )
        .await
        .expect("request hung after disconnect");
        assert!(matches!(result, Err(StoreError::Connectivity(_))));
    }
}

#[tokio::test]
async fn test_cannot_cancel_another_connections_feed() {
    let url = start_gateway().await;
    let owner = RemoteStore::connect(&url, 32).await.unwrap();
    let intruder = RemoteStore::connect(&url, 32).await.unwrap();

    let room = owner
        .create_room(
            RoomCode("135790".to_string()),
            "1234".parse().unwrap(),
            "Agni Flame".to_string(),
        )
        .await
        .unwrap();
    let mut feed = owner.subscribe_room_changes(room.code.clone()).await.unwrap();

    let err = intruder.unsubscribe(feed.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    intruder
        .create_player(room.code.clone(), "Late".to_string(), 2)
        .await
        .unwrap();
    let event = timeout(Duration::from_secs(5), feed.recv())
        .await
        .expect("feed went quiet")
        .expect("feed closed");
    assert!(matches!(event, ChangeEvent::PlayerInserted { player } if player.display_name == "Late"));

    owner.unsubscribe(feed.id).await.unwrap();
}
