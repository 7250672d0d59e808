//! HTTP control plane (C6): session list/allocate/join/modify, each
//! trading in the fixed binary encodings from `relay_codec::control`
//! rather than JSON (§4.5/§6).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use relay_codec::control::{JoinRequest, SessionInfo, SessionPreviewArray};
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::ServerHandle;

const OCTET_STREAM: &str = "application/octet-stream";

fn binary_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, OCTET_STREAM)], bytes).into_response()
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    skip: usize,
    #[serde(default = "ListQuery::default_limit")]
    limit: usize,
}

impl ListQuery {
    fn default_limit() -> usize {
        100
    }
}

async fn list_sessions(State(server): State<Arc<ServerHandle>>, query: Option<Query<ListQuery>>) -> Response {
    let Query(query) = query.unwrap_or(Query(ListQuery {
        skip: 0,
        limit: ListQuery::default_limit(),
    }));

    let previews = server.core.list_sessions(query.skip, query.limit);
    binary_response(SessionPreviewArray(previews).encode().to_vec())
}

async fn allocate_session(State(server): State<Arc<ServerHandle>>, body: Bytes) -> Response {
    let info = match SessionInfo::decode(&body) {
        Ok(info) => info,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let response = server.core.allocate_session(info);
    let mut buf = bytes::BytesMut::new();
    response.encode(&mut buf);
    binary_response(buf.to_vec())
}

async fn join_session(State(server): State<Arc<ServerHandle>>, body: Bytes) -> Response {
    let request = match JoinRequest::decode(&body) {
        Ok(request) => request,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let response = server.core.request_join(request.session_id);
    let mut buf = bytes::BytesMut::new();
    response.encode(&mut buf);
    binary_response(buf.to_vec())
}

async fn modify_session(State(server): State<Arc<ServerHandle>>, body: Bytes) -> Response {
    let info = match SessionInfo::decode(&body) {
        Ok(info) => info,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let response = server.core.request_modify(info);
    let mut buf = bytes::BytesMut::new();
    response.encode(&mut buf);
    binary_response(buf.to_vec())
}

/// Supplemental feature 2: read-only counters, grounded in the teacher's
/// `/stats`-shaped controller endpoint. Still binary, for consistency
/// with the rest of the surface.
async fn stats(State(server): State<Arc<ServerHandle>>) -> Response {
    let stats = server.core.observer().stats();
    let mut buf = bytes::BytesMut::new();
    use bytes::BufMut;
    buf.put_u64_le(stats.sessions_created);
    buf.put_u64_le(stats.sessions_closed);
    buf.put_u64_le(stats.payloads_relayed);
    buf.put_u64_le(stats.tokens_issued);
    buf.put_u64_le(stats.tokens_expired);
    buf.put_u64_le(stats.connections_rejected);
    binary_response(buf.to_vec())
}

pub async fn serve(server: Arc<ServerHandle>) -> anyhow::Result<()> {
    let addr = server.config.http.socket_addr()?;

    let app = Router::new()
        .route("/session/list", get(list_sessions))
        .route("/session/allocate", post(allocate_session))
        .route("/session/join", post(join_session))
        .route("/session/modify", post(modify_session))
        .route("/stats", get(stats))
        .with_state(server);

    let listener = TcpListener::bind(addr).await?;
    log::info!("http control plane listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
