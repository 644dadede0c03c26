use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use herald_types::events::{GatewayCommand, GatewayEvent};

use crate::fanout::Fanout;
use crate::registry::PresenceRegistry;

/// Heartbeat interval: the server pings every 15 seconds. Two missed
/// pongs (~30s) and the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one authenticated WebSocket until either side goes away.
///
/// The credential was already checked at the HTTP upgrade, so this sends
/// the ready ack straight away, registers presence, and then pumps events
/// out and commands in. On teardown the presence entry is removed only if
/// it still belongs to this connection.
pub async fn handle_connection(
    socket: WebSocket,
    registry: PresenceRegistry,
    fanout: Fanout,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    let Ok(ready_json) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    let (conn_id, mut events) = registry.register(user_id).await;
    info!(
        "{} ({}) connected to gateway ({} online)",
        username,
        user_id,
        registry.online_count().await
    );

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Registry events -> client, with heartbeat interleaved.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // first tick fires immediately
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    // None: superseded by a newer connection, or shutdown
                    let Some(event) = event else { break };
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::AcqRel) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout, dropping connection");
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Client commands -> fan-out.
    let recv_fanout = fanout.clone();
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(command) => {
                        handle_command(&recv_fanout, user_id, &recv_username, command).await;
                    }
                    Err(e) => {
                        warn!("{} ({}) sent a bad command: {}", recv_username, user_id, e);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever half finishes first tears the other down.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn handle_command(fanout: &Fanout, user_id: Uuid, username: &str, command: GatewayCommand) {
    match command {
        GatewayCommand::Typing { conversation_id } => {
            fanout.typing(conversation_id, user_id, username).await;
        }
    }
}
