use std::time::Duration;

use audiowallet_core::{ErrorCode, Message, Platform, ShareFileDescriptor, decode_chunk_frame, encode_chunk_frame};
use audiowallet_host::Host;
use audiowallet_host::config::HostConfig;
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpListener, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsWrite = futures::stream::SplitSink<WsStream, tungstenite::Message>;
type WsRead = futures::stream::SplitStream<WsStream>;

struct TestClient {
    write: WsWrite,
    read: WsRead,
}

impl TestClient {
    async fn send(&mut self, message: &Message) {
        self.write
            .send(tungstenite::Message::Text(message.to_json().into()))
            .await
            .expect("send text frame");
    }

    async fn send_chunk(&mut self, transfer_id: &str, chunk: &[u8]) {
        let frame = encode_chunk_frame(transfer_id, chunk).expect("encode chunk");
        self.write
            .send(tungstenite::Message::Binary(frame.into()))
            .await
            .expect("send binary frame");
    }

    async fn recv(&mut self, wait: Duration) -> Option<Message> {
        loop {
            let next = timeout(wait, self.read.next()).await.ok()??;
            match next.ok()? {
                tungstenite::Message::Text(text) => return Message::from_json(&text).ok(),
                tungstenite::Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    async fn recv_chunk(&mut self, wait: Duration) -> Option<(String, Vec<u8>)> {
        loop {
            let next = timeout(wait, self.read.next()).await.ok()??;
            match next.ok()? {
                tungstenite::Message::Binary(bytes) => {
                    let (transfer_id, chunk) = decode_chunk_frame(&bytes).ok()?;
                    return Some((transfer_id, chunk.to_vec()));
                }
                tungstenite::Message::Text(_) => continue,
                tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
                tungstenite::Message::Close(_) => return None,
                tungstenite::Message::Frame(_) => continue,
            }
        }
    }

    /// Drain frames until `pred` matches one, discarding everything else.
    async fn recv_until(&mut self, wait: Duration, pred: impl Fn(&Message) -> bool) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.checked_duration_since(tokio::time::Instant::now())?;
            let message = self.recv(remaining).await?;
            if pred(&message) {
                return Some(message);
            }
        }
    }
}

fn test_config(room_name: &str) -> HostConfig {
    let mut config = HostConfig::default();
    config.room_name = room_name.to_owned();
    config.announce = false;
    config.bind_host = "127.0.0.1".to_owned();
    config.port = 0;
    config
}

async fn start_host(config: HostConfig) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind(&config.listen_address()).await.expect("bind ephemeral host socket");
    let address = listener.local_addr().expect("host local addr");
    let host = Host::new(config);
    let join = tokio::spawn(async move {
        let _ = host.serve(listener, std::future::pending()).await;
    });
    (format!("ws://{address}/"), join)
}

async fn connect_and_hello(ws_url: &str, peer_id: &str, device_name: &str) -> TestClient {
    let (ws_stream, _) = connect_async(ws_url).await.expect("connect websocket");
    let (write, read) = ws_stream.split();
    let mut client = TestClient { write, read };

    client
        .send(&Message::Hello {
            peer_id: peer_id.to_owned(),
            device_name: device_name.to_owned(),
            platform: Platform::Android,
            app_version: None,
            admin_token: None,
            ts: 0,
        })
        .await;
    let welcome = client.recv(Duration::from_secs(2)).await.expect("expect WELCOME");
    assert!(matches!(welcome, Message::Welcome { .. }));
    client
}

fn share_one(file_id: &str, owner_size: u64) -> ShareFileDescriptor {
    ShareFileDescriptor {
        file_id: file_id.to_owned(),
        title: "Track".to_owned(),
        artist: Some("Artist".to_owned()),
        album: None,
        duration_seconds: Some(180),
        size_bytes: owner_size,
        mime_type: "audio/mpeg".to_owned(),
        sha256: "a".repeat(64),
    }
}

#[tokio::test]
async fn minimal_join_and_list() {
    let (address, join) = start_host(test_config("Minimal")).await;
    let mut client = connect_and_hello(&address, "p1", "Phone").await;

    client.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    let room_info = client.recv(Duration::from_secs(2)).await.expect("expect ROOM_INFO");
    assert!(matches!(room_info, Message::RoomInfo { room_name, .. } if room_name == "Minimal"));

    let index_full = client.recv(Duration::from_secs(2)).await.expect("expect INDEX_FULL");
    assert!(matches!(index_full, Message::IndexFull { files, .. } if files.is_empty()));

    join.abort();
}

#[tokio::test]
async fn two_peer_share_broadcasts_index_upsert() {
    let (address, join) = start_host(test_config("Share")).await;
    let mut owner = connect_and_hello(&address, "owner", "Owner Phone").await;
    owner.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    owner.recv(Duration::from_secs(2)).await; // ROOM_INFO
    owner.recv(Duration::from_secs(2)).await; // INDEX_FULL

    let mut listener = connect_and_hello(&address, "listener", "Listener Phone").await;
    listener.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    listener.recv(Duration::from_secs(2)).await; // ROOM_INFO
    listener.recv(Duration::from_secs(2)).await; // INDEX_FULL
    let peer_joined = listener
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::PeerJoined { .. }))
        .await;
    assert!(peer_joined.is_none(), "owner already joined before listener, no PEER_JOINED expected for it");

    owner
        .send(&Message::ShareFiles {
            files: vec![share_one("f1", 1024)],
            ts: 0,
        })
        .await;

    let upsert = listener
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::IndexUpsert { .. }))
        .await
        .expect("listener receives INDEX_UPSERT");
    match upsert {
        Message::IndexUpsert { files, .. } => {
            assert_eq!(files.len(), 1);
            assert_eq!(files[0].file_id, "f1");
            assert_eq!(files[0].owner_peer_id, "owner");
        }
        _ => unreachable!(),
    }

    join.abort();
}

#[tokio::test]
async fn successful_relay_transfer_completes() {
    let (address, join) = start_host(test_config("Relay")).await;
    let mut owner = connect_and_hello(&address, "owner", "Owner").await;
    owner.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    owner.recv(Duration::from_secs(2)).await;
    owner.recv(Duration::from_secs(2)).await;
    owner
        .send(&Message::ShareFiles {
            files: vec![share_one("song", 11)],
            ts: 0,
        })
        .await;

    let mut requester = connect_and_hello(&address, "requester", "Requester").await;
    requester.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    requester.recv(Duration::from_secs(2)).await;
    requester.recv(Duration::from_secs(2)).await;

    requester
        .send(&Message::RelayPull {
            file_id: "song".to_owned(),
            transfer_id: "t1".to_owned(),
            requester_peer_id: None,
            ts: 0,
        })
        .await;

    let pull = owner
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::RelayPull { .. }))
        .await
        .expect("owner receives RELAY_PULL");
    let transfer_id = match pull {
        Message::RelayPull { transfer_id, .. } => transfer_id,
        _ => unreachable!(),
    };

    owner
        .send(&Message::RelayPushMeta {
            transfer_id: transfer_id.clone(),
            file_id: "song".to_owned(),
            size: 11,
            mime_type: "audio/mpeg".to_owned(),
            sha256: "a".repeat(64),
            ts: 0,
        })
        .await;

    let start = requester
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::TransferStart { .. }))
        .await
        .expect("requester receives TRANSFER_START");
    assert!(matches!(start, Message::TransferStart { size: 11, .. }));

    owner.send_chunk(&transfer_id, b"hello world").await;
    let (received_id, chunk) = requester.recv_chunk(Duration::from_secs(2)).await.expect("requester receives chunk");
    assert_eq!(received_id, transfer_id);
    assert_eq!(chunk, b"hello world");

    owner
        .send(&Message::RelayComplete {
            transfer_id: transfer_id.clone(),
            file_id: "song".to_owned(),
            ts: 0,
        })
        .await;

    let complete = requester
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::TransferComplete { .. }))
        .await
        .expect("requester receives TRANSFER_COMPLETE");
    assert!(matches!(complete, Message::TransferComplete { transfer_id: ref id, .. } if *id == transfer_id));

    join.abort();
}

#[tokio::test]
async fn owner_disconnect_mid_transfer_orphans_the_requester() {
    let (address, join) = start_host(test_config("Orphan")).await;
    let mut owner = connect_and_hello(&address, "owner", "Owner").await;
    owner.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    owner.recv(Duration::from_secs(2)).await;
    owner.recv(Duration::from_secs(2)).await;
    owner
        .send(&Message::ShareFiles {
            files: vec![share_one("song", 11)],
            ts: 0,
        })
        .await;

    let mut requester = connect_and_hello(&address, "requester", "Requester").await;
    requester.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    requester.recv(Duration::from_secs(2)).await;
    requester.recv(Duration::from_secs(2)).await;

    requester
        .send(&Message::RelayPull {
            file_id: "song".to_owned(),
            transfer_id: "t1".to_owned(),
            requester_peer_id: None,
            ts: 0,
        })
        .await;
    let pull = owner
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::RelayPull { .. }))
        .await
        .expect("owner receives RELAY_PULL");
    let transfer_id = match pull {
        Message::RelayPull { transfer_id, .. } => transfer_id,
        _ => unreachable!(),
    };
    owner
        .send(&Message::RelayPushMeta {
            transfer_id: transfer_id.clone(),
            file_id: "song".to_owned(),
            size: 11,
            mime_type: "audio/mpeg".to_owned(),
            sha256: "a".repeat(64),
            ts: 0,
        })
        .await;
    requester.recv_until(Duration::from_secs(2), |m| matches!(m, Message::TransferStart { .. })).await;

    drop(owner);

    let error = requester
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::Error { .. }))
        .await
        .expect("requester receives ERROR after owner disconnects");
    assert!(matches!(error, Message::Error { ref code, .. } if code == ErrorCode::OwnerGone.as_str()));

    join.abort();
}

#[tokio::test]
async fn locked_room_rejects_share_files_from_non_admin() {
    let mut config = test_config("Locked");
    config.locked = true;
    let (address, join) = start_host(config).await;

    let mut peer = connect_and_hello(&address, "p1", "Phone").await;
    peer.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    peer.recv(Duration::from_secs(2)).await;
    peer.recv(Duration::from_secs(2)).await;

    peer.send(&Message::ShareFiles {
        files: vec![share_one("f1", 10)],
        ts: 0,
    })
    .await;

    let error = peer.recv(Duration::from_secs(2)).await.expect("expect ERROR");
    assert!(matches!(error, Message::Error { ref code, .. } if code == ErrorCode::RoomLocked.as_str()));

    join.abort();
}

#[tokio::test]
async fn heartbeat_timeout_evicts_peer_and_announces_departure() {
    let mut config = test_config("Timeout");
    config.heartbeat_interval_ms = 30;
    config.heartbeat_timeout_ms = 60;
    let (address, join) = start_host(config).await;

    let mut silent = connect_and_hello(&address, "silent", "Silent Phone").await;
    silent.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    silent.recv(Duration::from_secs(2)).await;
    silent.recv(Duration::from_secs(2)).await;
    silent
        .send(&Message::ShareFiles {
            files: vec![share_one("f1", 10)],
            ts: 0,
        })
        .await;

    let mut observer = connect_and_hello(&address, "observer", "Observer Phone").await;
    observer.send(&Message::JoinRoom { room_id: None, ts: 0 }).await;
    observer.recv(Duration::from_secs(2)).await;
    observer.recv(Duration::from_secs(2)).await;

    let closed = timeout(Duration::from_secs(2), silent.read.next()).await.expect("silent socket should close");
    assert!(matches!(closed, Some(Ok(tungstenite::Message::Close(_)))) || closed.is_none());

    let peer_left = observer
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::PeerLeft { .. }))
        .await
        .expect("observer receives PEER_LEFT");
    assert!(matches!(peer_left, Message::PeerLeft { peer_id, .. } if peer_id == "silent"));

    let index_remove = observer
        .recv_until(Duration::from_secs(2), |m| matches!(m, Message::IndexRemove { .. }))
        .await
        .expect("observer receives INDEX_REMOVE for the evicted peer's files");
    assert!(matches!(index_remove, Message::IndexRemove { file_ids, .. } if file_ids == vec!["f1".to_owned()]));

    join.abort();
}

#[tokio::test]
async fn hello_with_stale_peer_id_supersedes_and_closes_previous_session() {
    let (address, join) = start_host(test_config("Replace")).await;
    let mut first = connect_and_hello(&address, "dupe", "First").await;
    let _second = connect_and_hello(&address, "dupe", "Second").await;

    let closed = timeout(Duration::from_secs(2), first.read.next()).await.expect("first session should be closed");
    match closed {
        Some(Ok(tungstenite::Message::Close(Some(frame)))) => {
            // 4001 is this crate's REPLACED close code (lib.rs `close_frame`).
            assert_eq!(frame.code, 4001);
        }
        other => panic!("expected a REPLACED close frame, got {other:?}"),
    }

    join.abort();
}
