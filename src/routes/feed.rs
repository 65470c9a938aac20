use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use serde_json::json;
use tracing::{debug, warn};

use crate::feed::{FeedFilter, FeedMessage};
use crate::router::AppState;

/// Streams row changes matching the filter as server-sent events.
///
/// `change` events carry the serialized [`crate::feed::Change`]. A `resync`
/// event means events were dropped and the client must reload before folding more.
pub async fn feed(
    State(state): State<AppState>,
    Query(filter): Query<FeedFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(?filter, "feed subscriber connected");
    let subscription = state.engine.subscribe(filter);
    let events = stream::unfold(subscription, |mut subscription| async move {
        let message = subscription.recv().await?;
        let event = match message {
            FeedMessage::Change(change) => Event::default().event("change").json_data(&change),
            FeedMessage::Resync { missed } => {
                warn!(missed, filter = ?subscription.filter(), "feed subscriber lagged");
                Event::default()
                    .event("resync")
                    .json_data(json!({ "missed": missed }))
            }
        };
        let event = event.unwrap_or_else(|err| {
            warn!(error = %err, "dropping unserializable feed event");
            Event::default().comment("skipped")
        });
        Some((Ok(event), subscription))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
