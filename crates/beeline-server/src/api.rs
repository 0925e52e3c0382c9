use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, patch, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use beeline_client::contacts::{ContactView, RequestView, SentRequestView};
use beeline_client::{AuthUser, Client, ClientError};
use beeline_shared::UserId;
use beeline_store::{ContactRequest, Invite, Message, Notification};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/auth/register", post(auth_register))
        .route("/auth/login", post(auth_login))
        .route("/auth/logout", post(auth_logout))
        .route("/auth/me", get(auth_me))
        .route("/auth/username", post(auth_claim_username))
        .route("/auth/profile", patch(auth_update_profile))
        .route("/users", get(users_list))
        .route("/users/:query", get(users_lookup))
        .route("/contacts", get(contacts_list))
        .route("/contacts/:contact_id", delete(contacts_delete))
        .route("/contacts/requests", get(requests_list).post(requests_send))
        .route("/contacts/requests/:id/respond", post(requests_respond))
        .route("/chat/:peer_id/messages", get(messages_list).post(messages_send))
        .route("/chat/:peer_id/read", post(chat_mark_read))
        .route("/invites", post(invites_create))
        .route("/invites/:token", get(invites_lookup))
        .route("/invites/:token/redeem", post(invites_redeem))
        .route("/notifications", get(notifications_list))
        .route("/notifications/:id/read", post(notifications_read))
        .route("/events", get(events_stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Plumbing ───

/// Pull the bearer session token out of the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ServerError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);
    if token.is_empty() {
        return Err(ServerError::App(ClientError::Unauthenticated));
    }
    Ok(token)
}

fn parse_user_id(raw: &str) -> Result<UserId, ServerError> {
    UserId::parse(raw).map_err(|_| ServerError::BadRequest(format!("Invalid user id: {raw}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw).map_err(|_| ServerError::BadRequest(format!("Invalid id: {raw}")))
}

// ─── Health and instance info ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    registration_open: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        registration_open: state.config.registration_open,
    })
}

// ─── Auth ───

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    user: AuthUser,
    token: String,
}

async fn auth_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<SessionResponse>, ServerError> {
    let (user, token) = state
        .client
        .auth()
        .register(&req.email, &req.password, &req.display_name)
        .await?;
    Ok(Json(SessionResponse { user, token }))
}

async fn auth_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ServerError> {
    let (user, token) = state.client.auth().sign_in(&req.email, &req.password).await?;
    Ok(Json(SessionResponse { user, token }))
}

async fn auth_logout(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let token = bearer_token(&headers)?;
    state.client.auth().sign_out(token).await;
    Ok(Json(serde_json::json!({ "signedOut": true })))
}

async fn auth_me(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<AuthUser>, ServerError> {
    let token = bearer_token(&headers)?;
    let user = state.client.auth().resolve(token).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct ClaimUsernameRequest {
    username: String,
}

async fn auth_claim_username(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ClaimUsernameRequest>,
) -> Result<Json<AuthUser>, ServerError> {
    let token = bearer_token(&headers)?;
    let user = state.client.auth().claim_username(token, &req.username).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    display_name: Option<String>,
    photo_url: Option<String>,
}

async fn auth_update_profile(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<AuthUser>, ServerError> {
    let token = bearer_token(&headers)?;
    let user = state
        .client
        .auth()
        .update_profile(token, req.display_name.as_deref(), req.photo_url.as_deref())
        .await?;
    Ok(Json(user))
}

// ─── Users ───

async fn users_list(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<AuthUser>>, ServerError> {
    let token = bearer_token(&headers)?;
    let users = state.client.list_users(token).await?;
    Ok(Json(users))
}

async fn users_lookup(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<AuthUser>, ServerError> {
    let token = bearer_token(&headers)?;
    let user = state.client.lookup_user(token, &query).await?;
    Ok(Json(user))
}

// ─── Contacts ───

async fn contacts_list(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<ContactView>>, ServerError> {
    let token = bearer_token(&headers)?;
    let contacts = state.client.list_contacts(token).await?;
    Ok(Json(contacts))
}

async fn contacts_delete(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(contact_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let token = bearer_token(&headers)?;
    let id = parse_uuid(&contact_id)?;
    state.client.remove_contact(token, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Serialize)]
struct RequestsResponse {
    incoming: Vec<RequestView>,
    sent: Vec<SentRequestView>,
}

async fn requests_list(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<RequestsResponse>, ServerError> {
    let token = bearer_token(&headers)?;
    let incoming = state.client.pending_requests(token).await?;
    let sent = state.client.sent_requests(token).await?;
    Ok(Json(RequestsResponse { incoming, sent }))
}

#[derive(Deserialize)]
struct SendRequestRequest {
    /// Username or email of the person to add.
    target: String,
}

async fn requests_send(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<SendRequestRequest>,
) -> Result<Json<ContactRequest>, ServerError> {
    let token = bearer_token(&headers)?;
    let request = state.client.send_request(token, &req.target).await?;
    Ok(Json(request))
}

#[derive(Deserialize)]
struct RespondRequest {
    accept: bool,
}

async fn requests_respond(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let token = bearer_token(&headers)?;
    let request_id = parse_uuid(&id)?;
    state
        .client
        .respond_request(token, request_id, req.accept)
        .await?;
    Ok(Json(serde_json::json!({ "status": if req.accept { "accepted" } else { "rejected" } })))
}

// ─── Chat ───

async fn messages_list(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let token = bearer_token(&headers)?;
    let peer = parse_user_id(&peer_id)?;
    let messages = state.client.list_messages(token, peer).await?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
struct SendMessageRequest {
    text: String,
}

async fn messages_send(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, ServerError> {
    let token = bearer_token(&headers)?;
    let peer = parse_user_id(&peer_id)?;
    let message = state.client.send_message(token, peer, &req.text).await?;
    Ok(Json(message))
}

async fn chat_mark_read(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let token = bearer_token(&headers)?;
    let peer = parse_user_id(&peer_id)?;
    let updated = state.client.mark_read(token, peer).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

// ─── Invites ───

#[derive(Serialize)]
struct InviteResponse {
    invite: Invite,
    /// Path fragment for the shareable link.
    link: String,
}

async fn invites_create(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<InviteResponse>, ServerError> {
    let token = bearer_token(&headers)?;
    let invite = state.client.create_invite(token).await?;
    let link = format!("/invite/{}", invite.id);
    info!(invite = %invite.id, "invite link issued");
    Ok(Json(InviteResponse { invite, link }))
}

#[derive(Serialize)]
struct InviteInfoResponse {
    creator_name: String,
    creator_photo: Option<String>,
    created_at: String,
    expires_at: String,
}

async fn invites_lookup(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(token_str): Path<String>,
) -> Result<Json<InviteInfoResponse>, ServerError> {
    let token = bearer_token(&headers)?;
    let invite = state.client.lookup_invite(token, &token_str).await?;
    Ok(Json(InviteInfoResponse {
        creator_name: invite.creator_name,
        creator_photo: invite.creator_photo,
        created_at: invite.created_at.to_rfc3339(),
        expires_at: invite.expires_at.to_rfc3339(),
    }))
}

async fn invites_redeem(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(token_str): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let token = bearer_token(&headers)?;
    let chat_id = state.client.redeem_invite(token, &token_str).await?;
    Ok(Json(serde_json::json!({ "chatId": chat_id.as_str() })))
}

// ─── Notifications ───

#[derive(Deserialize)]
struct NotificationsQuery {
    #[serde(default)]
    unread: bool,
}

async fn notifications_list(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<Notification>>, ServerError> {
    let token = bearer_token(&headers)?;
    let notifications = state.client.notifications(token, query.unread).await?;
    Ok(Json(notifications))
}

async fn notifications_read(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let token = bearer_token(&headers)?;
    let notification_id = parse_uuid(&id)?;
    state
        .client
        .mark_notification_read(token, notification_id)
        .await?;
    Ok(Json(serde_json::json!({ "read": true })))
}

// ─── Event stream ───

/// Server-sent events: the caller's slice of the application event bus.
/// This is the HTTP rendition of the store's live pushes; clients re-query
/// the regular endpoints when an event arrives.
async fn events_stream(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let token = bearer_token(&headers)?;
    let me = state.client.auth().resolve(token).await?;
    let uid = me.uid;
    let rx = state.client.events().subscribe();

    let stream = futures::stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(envelope) if envelope.user_id == uid => {
                    match Event::default().event(envelope.event).json_data(&envelope.data) {
                        Ok(event) => return Some((Ok::<_, Infallible>(event), rx)),
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode SSE event");
                            continue;
                        }
                    }
                }
                // Someone else's event.
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ─── Serving ───

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc123");

        // A bare token is tolerated.
        headers.insert("authorization", "abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc123");
    }
}
