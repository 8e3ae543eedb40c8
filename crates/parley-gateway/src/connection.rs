use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};
use uuid::Uuid;

use parley_core::{Messaging, Subscription};
use parley_types::api::Claims;
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a client has to send Identify after connecting.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a gateway connection needs, cloned per socket.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub messaging: Messaging,
    pub jwt_secret: Arc<str>,
}

/// Validate a bearer token and return its claims.
pub fn decode_claims(token: &str, jwt_secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Handle a WebSocket whose token was already checked at the HTTP upgrade.
pub async fn handle_connection_authenticated(socket: WebSocket, ctx: GatewayContext, claims: Claims) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway (pre-authenticated)", claims.username, claims.sub);

    let ready = GatewayEvent::Ready {
        user_id: claims.sub,
        username: claims.username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    run_connection_loop(sender, receiver, ctx, claims.sub, claims.username).await;
}

/// Handle a WebSocket that authenticates with an Identify command.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();

    let Some(claims) = wait_for_identify(&mut receiver, &ctx.jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} ({}) connected to gateway", claims.username, claims.sub);

    let ready = GatewayEvent::Ready {
        user_id: claims.sub,
        username: claims.username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    run_connection_loop(sender, receiver, ctx, claims.sub, claims.username).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    user_id: Uuid,
    username: String,
) {
    // Targeted notifications and live message inserts share one outbound queue.
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let conn_id = ctx.dispatcher.register_connection(user_id, tx.clone()).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
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

    let messaging = ctx.messaging.clone();
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        // Dropping the map (task end or abort) releases every live subscription.
        let mut subscriptions: HashMap<Uuid, Subscription> = HashMap::new();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&messaging, user_id, cmd, &mut subscriptions, &tx).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
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

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.unregister_connection(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<Claims> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg
                && let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text)
            {
                return decode_claims(&token, jwt_secret);
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

/// Apply one client command to this connection's subscription set. Replies
/// go out on `tx`.
async fn handle_command(
    messaging: &Messaging,
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &mut HashMap<Uuid, Subscription>,
    tx: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { conversation_ids } => {
            for conversation_id in conversation_ids {
                if subscriptions.contains_key(&conversation_id) {
                    continue;
                }
                if let Err(e) = messaging.conversations.ensure_participant(conversation_id, user_id).await {
                    let _ = tx.send(GatewayEvent::Error {
                        message: format!("Cannot subscribe to {}: {}", conversation_id, e),
                    });
                    continue;
                }

                let live_tx = tx.clone();
                let subscription = messaging.live.subscribe(conversation_id, move |m| {
                    let _ = live_tx.send(GatewayEvent::MessageCreate {
                        conversation_id: m.conversation_id,
                        message_id: m.id,
                        sender_id: m.sender_id,
                        timestamp: m.created_at,
                    });
                });
                subscriptions.insert(conversation_id, subscription);
            }
            trace!("{} now subscribed to {} conversations", user_id, subscriptions.len());
            let _ = tx.send(subscribed(subscriptions));
        }

        GatewayCommand::Unsubscribe { conversation_ids } => {
            for conversation_id in conversation_ids {
                if let Some(subscription) = subscriptions.remove(&conversation_id) {
                    subscription.unsubscribe();
                }
            }
            let _ = tx.send(subscribed(subscriptions));
        }
    }
}

fn subscribed(subscriptions: &HashMap<Uuid, Subscription>) -> GatewayEvent {
    let mut conversation_ids: Vec<Uuid> = subscriptions.keys().copied().collect();
    conversation_ids.sort();
    GatewayEvent::Subscribed { conversation_ids }
}
