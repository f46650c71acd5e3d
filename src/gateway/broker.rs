use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use uuid::Uuid;

use crate::clock;
use crate::context::HEADER_INTERNAL_TOKEN;
use crate::error::ApiError;
use crate::events::{EventEnvelope, topics};

use super::{AuthUser, GatewayState};

/// Per-client queue bound. A consumer that falls further behind than
/// this silently loses events; it never slows anyone else down.
pub const CLIENT_QUEUE_CAPACITY: usize = 100;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

struct BrokerClient {
    topics: HashSet<String>,
    tx: mpsc::Sender<EventEnvelope>,
}

/// In-process pub/sub registry behind the SSE endpoint.
#[derive(Default)]
pub struct Broker {
    clients: Mutex<HashMap<String, BrokerClient>>,
}

impl Broker {
    pub fn new() -> Self {
        Broker::default()
    }

    pub fn register(
        &self,
        subscribed: HashSet<String>,
    ) -> (String, mpsc::Receiver<EventEnvelope>) {
        let client_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);

        let mut clients = self.lock();
        clients.insert(
            client_id.clone(),
            BrokerClient {
                topics: subscribed,
                tx,
            },
        );
        (client_id, rx)
    }

    pub fn unregister(&self, client_id: &str) {
        self.lock().remove(client_id);
    }

    /// Non-blocking fan-out. Full queues drop the event for that client
    /// only; closed clients are reaped.
    pub fn broadcast(&self, envelope: &EventEnvelope) -> usize {
        let mut clients = self.lock();
        let mut delivered = 0;
        let mut dead: Vec<String> = Vec::new();

        for (client_id, client) in clients.iter() {
            if !client.topics.contains(&envelope.topic) && !client.topics.contains(topics::ALL) {
                continue;
            }
            match client.tx.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(client_id.clone()),
            }
        }
        for client_id in dead {
            clients.remove(&client_id);
        }
        delivered
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every client sender, ending all streams.
    pub fn shutdown(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BrokerClient>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the registry entry when the SSE stream is dropped, whatever
/// the reason for the disconnect.
struct ClientGuard {
    broker: std::sync::Arc<Broker>,
    client_id: String,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.broker.unregister(&self.client_id);
    }
}

#[derive(Deserialize)]
pub struct TopicsQuery {
    topics: Option<String>,
}

pub async fn event_stream(
    _auth: AuthUser,
    State(state): State<GatewayState>,
    Query(query): Query<TopicsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscribed: HashSet<String> = query
        .topics
        .as_deref()
        .unwrap_or(topics::ALL)
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let (client_id, mut rx) = state.broker.register(subscribed.clone());
    let guard = ClientGuard {
        broker: state.broker.clone(),
        client_id: client_id.clone(),
    };

    let stream = async_stream::stream! {
        let _guard = guard;

        let hello = json!({
            "client_id": client_id,
            "topics": subscribed.iter().collect::<Vec<_>>(),
        });
        yield Ok(Event::default().event("connected").data(hello.to_string()));

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // the immediate first tick

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(envelope) => {
                        let payload = json!({
                            "type": envelope.event_type,
                            "data": envelope.data,
                            "timestamp": envelope.timestamp,
                        });
                        yield Ok(Event::default()
                            .event(envelope.event_type)
                            .data(payload.to_string()));
                    }
                    // Broker shut down; close the stream.
                    None => break,
                },
                _ = heartbeat.tick() => {
                    let payload = json!({ "timestamp": clock::unix_now() });
                    yield Ok(Event::default().event("heartbeat").data(payload.to_string()));
                }
            }
        }
    };

    Sse::new(stream)
}

/// Broadcast ingress for backends. Internal: callers authenticate with
/// the shared service token, not a user bearer.
pub async fn broadcast(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(envelope): Json<EventEnvelope>,
) -> Result<Json<Value>, ApiError> {
    let provided = headers
        .get(HEADER_INTERNAL_TOKEN)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing internal service token"))?;
    if provided != state.cfg.internal_token {
        return Err(ApiError::unauthorized("invalid internal service token"));
    }

    let delivered = state.broker.broadcast(&envelope);
    Ok(Json(json!({
        "delivered": delivered,
        "clients": state.broker.client_count(),
    })))
}
