//! End-to-end exchange behavior against a local WebSocket gateway

use futures::{SinkExt, StreamExt};
use robowire::{ConsoleSettings, LinkState, OperatorConsole, UpdateRate, frame};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

/// One accepted exchange and the handshake that opened it
struct Peer {
    handshake: serde_json::Value,
    socket: WebSocketStream<TcpStream>,
}

impl Peer {
    fn exchange(&self) -> &str {
        self.handshake["exchange"].as_str().unwrap_or_default()
    }

    async fn next_text(&mut self) -> serde_json::Value {
        loop {
            let message = tokio::time::timeout(TIMEOUT, self.socket.next())
                .await
                .expect("timed out waiting for the console")
                .expect("console closed the link")
                .expect("websocket error");
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }
}

/// Accept connections forever and report each one after its handshake
async fn spawn_gateway() -> (String, mpsc::UnboundedReceiver<Peer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let peers = peers_tx.clone();
            tokio::spawn(async move {
                let mut socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
                if let Some(Ok(Message::Text(text))) = socket.next().await {
                    let handshake = serde_json::from_str(&text).unwrap();
                    let _ = peers.send(Peer { handshake, socket });
                }
            });
        }
    });

    (endpoint, peers_rx)
}

async fn next_peer(peers: &mut mpsc::UnboundedReceiver<Peer>) -> Peer {
    tokio::time::timeout(TIMEOUT, peers.recv()).await.unwrap().unwrap()
}

async fn accept_console(peers: &mut mpsc::UnboundedReceiver<Peer>) -> (Peer, Peer, Peer) {
    let (mut camera, mut state, mut commands) = (None, None, None);
    for _ in 0..3 {
        let peer = next_peer(peers).await;
        match peer.exchange() {
            "camera0" => camera = Some(peer),
            "state" => state = Some(peer),
            "commands" => commands = Some(peer),
            other => panic!("unexpected exchange {other}"),
        }
    }
    (camera.unwrap(), state.unwrap(), commands.unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn console_round_trip_over_websockets() {
    let _ = tracing_subscriber::fmt::try_init();

    let (endpoint, mut peers) = spawn_gateway().await;
    let console = OperatorConsole::connect(ConsoleSettings::new(endpoint, "r2d2", "abc")).unwrap();
    let (mut camera, mut state, mut commands) = accept_console(&mut peers).await;

    assert_eq!(camera.handshake["command"], "pull");
    assert_eq!(camera.handshake["accessToken"], "abc");
    assert_eq!(commands.handshake["command"], "push");
    tokio::time::timeout(TIMEOUT, console.wait_until_open()).await.unwrap();

    // Telemetry in
    let mut images = console.telemetry().subscribe_images(UpdateRate::Native);
    let mut data = console.telemetry().subscribe_robot_data(UpdateRate::Native);
    let composite = frame::encode(b"\xFF\xD8\xFF", b"", br#"{"battery":0.9}"#).unwrap();
    camera.socket.send(Message::Binary(composite.to_vec())).await.unwrap();

    let image = tokio::time::timeout(TIMEOUT, images.next()).await.unwrap().unwrap();
    assert_eq!(image.data.as_ref(), b"\xFF\xD8\xFF");
    let status = tokio::time::timeout(TIMEOUT, data.next()).await.unwrap().unwrap();
    assert_eq!(status.0["battery"], 0.9);

    let mut states = console.telemetry().subscribe_states(UpdateRate::Native);
    state.socket.send(Message::Binary(br#"{"joints":[0.5]}"#.to_vec())).await.unwrap();
    let received = tokio::time::timeout(TIMEOUT, states.next()).await.unwrap().unwrap();
    assert_eq!(received.joints, Some(vec![0.5]));

    // Commands out, stamped with the latest status
    console.ask_for_manual().unwrap();
    console.set_tag(3).unwrap();
    let first = commands.next_text().await;
    assert_eq!(first["message"]["op"], "ask_for_manual");
    assert_eq!(first["message"]["robot_data"]["battery"], 0.9);
    assert_eq!(commands.next_text().await["message"]["tag"], 3);

    console.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_link_reconnects_and_flushes_queue() {
    let (endpoint, mut peers) = spawn_gateway().await;
    let console = OperatorConsole::connect(ConsoleSettings::new(endpoint, "r2d2", "abc")).unwrap();
    let (_camera, _state, commands) = accept_console(&mut peers).await;
    tokio::time::timeout(TIMEOUT, console.wait_until_open()).await.unwrap();

    let handshake = commands.handshake.clone();
    drop(commands);

    let mut reopened = next_peer(&mut peers).await;
    assert_eq!(reopened.handshake, handshake);
    assert_eq!(console.telemetry().camera_state(), LinkState::Open);

    console.go_home_safely().unwrap();
    assert_eq!(reopened.next_text().await["message"]["op"], "go_home_safely");

    console.close().await;
}

#[tokio::test]
async fn unreachable_gateway_keeps_retrying_until_shutdown() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}/ws", listener.local_addr().unwrap());
    drop(listener);

    let settings =
        ConsoleSettings::new(endpoint, "r2d2", "abc").with_reconnect_delay(Duration::from_millis(10));
    let console = OperatorConsole::connect(settings).unwrap();
    console.vacuum_on().unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_ne!(console.operator().state(), LinkState::Open);
    assert_ne!(console.operator().state(), LinkState::Shutdown);

    console.shutdown();
    assert_eq!(console.operator().state(), LinkState::Shutdown);
    assert!(console.vacuum_off().is_err());
    console.close().await;
}
