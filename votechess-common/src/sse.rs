//! SSE broadcaster for real-time observer updates

use axum::{
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::ServerEvent;

/// SSE Broadcaster manages observer connections and event distribution
#[derive(Clone)]
pub struct SseBroadcaster {
    tx: broadcast::Sender<ServerEvent>,
}

impl SseBroadcaster {
    /// Create a new SSE broadcaster
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        info!("SSE broadcaster initialized with capacity {}", capacity);
        Self { tx }
    }

    /// Broadcast an event, ignoring if no observers are connected
    pub fn broadcast_lossy(&self, event: ServerEvent) {
        let receivers = self.tx.receiver_count();
        if let Ok(count) = self.tx.send(event) {
            debug!("Broadcast event to {} observers", count);
        } else if receivers == 0 {
            debug!("Broadcast dropped, no observers connected");
        }
    }

    /// Current number of connected observers
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Subscribe to the raw event channel (used by tests)
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Create an SSE stream for a new observer connection
    ///
    /// `backlog` is delivered first, before any live event: a joining
    /// observer gets one consistent snapshot (and round-start, if a round is
    /// in progress) exactly as continuously-connected observers received
    /// them incrementally. The live subscription is opened before the
    /// backlog is yielded so no event falls into the gap.
    pub fn connection_stream(
        &self,
        backlog: Vec<ServerEvent>,
    ) -> impl Stream<Item = Result<Event, Infallible>> {
        let rx = self.tx.subscribe();

        let live = BroadcastStream::new(rx).filter_map(|result| async move {
            match result {
                Ok(event) => to_sse_event(&event).map(Ok),
                Err(e) => {
                    // BroadcastStream wraps RecvError on lag, just log and continue
                    warn!("SSE observer lagged: {:?}", e);
                    None
                }
            }
        });

        stream::iter(
            backlog
                .into_iter()
                .filter_map(|event| to_sse_event(&event).map(Ok)),
        )
        .chain(live)
    }

    /// Create an Axum SSE response for a new observer connection
    pub fn handle_connection(&self, backlog: Vec<ServerEvent>) -> impl IntoResponse {
        info!(
            "New SSE observer connected, total observers: {}",
            self.client_count() + 1
        );

        Sse::new(self.connection_stream(backlog)).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("keep-alive"),
        )
    }
}

fn to_sse_event(event: &ServerEvent) -> Option<Event> {
    // Event id lets reconnecting clients spot where they left off
    Event::default()
        .id(Uuid::new_v4().to_string())
        .event(event.name())
        .json_data(event)
        .ok()
}
