// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `GET /daemon/backup/stream/{site_id}` (§6.3): pushes `ProgressRow`
//! updates to the operator UI as Server-Sent Events. A browser `EventSource`
//! cannot set an `Authorization` header, so this endpoint authenticates via
//! a `token` query parameter carrying the same bearer JWT instead.
//!
//! Built on `futures::stream::unfold` rather than `async-stream`/
//! `tokio-stream`'s `BroadcastStream` - neither is a dependency of this
//! crate, and a plain `tokio::select!` between the progress channel's
//! `changed()` and an interval sleep covers both push-immediacy and the
//! interval ceiling/floor without adding one.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::SiteId;

use crate::http::middleware::{forbidden, load_assignments, ApiError};
use crate::http::state::AppState;

const MIN_INTERVAL_SECS: u64 = 1;
const MAX_INTERVAL_SECS: u64 = 60;
const DEFAULT_INTERVAL_SECS: u64 = 2;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub interval: Option<u64>,
    pub token: String,
}

fn clamp_interval(requested: Option<u64>) -> Duration {
    let secs = requested.unwrap_or(DEFAULT_INTERVAL_SECS).clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
    Duration::from_secs(secs)
}

fn row_event(row: &fleet_backup_domain::entities::ProgressRow) -> Event {
    match Event::default().json_data(row) {
        Ok(event) => event,
        Err(_) => Event::default().event("error").data("failed to serialize progress row"),
    }
}

pub async fn stream_progress(
    Path(site_id): Path<SiteId>,
    Query(params): Query<StreamParams>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let claims = state.tokens.verify_fully_authenticated(&params.token).map_err(ApiError)?;

    let site = state
        .sites
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;
    let assignments = load_assignments(&state, &claims).await?;
    if !crate::auth::rbac::can_view_site(claims.role, &assignments, &site) {
        return Err(forbidden("not authorized for this site"));
    }

    let interval = clamp_interval(params.interval);
    let receiver = state.progress.subscribe(site_id).await.map_err(ApiError)?;

    let initial = Ok(row_event(&receiver.borrow()));
    let rest = stream::unfold(receiver, move |mut receiver| async move {
        tokio::select! {
            changed = receiver.changed() => {
                changed.ok()?;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        let event = row_event(&receiver.borrow());
        Some((Ok(event), receiver))
    });

    let stream = stream::once(async move { initial }).chain(rest);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
