use std::time::Duration;

use reqwest::{header::CACHE_CONTROL, Client, Method, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{message_field, ApiError, GENERIC_FAILURE};
use crate::model::{
    normalize_board, validate_id, validate_use_count, ActionOutcome, Board, Pool,
    RegisterOutcome, RegistrantPage, RegistrantQuery, Registration, TicketAction, TicketCommand,
    DEFAULT_REJECT_REASON,
};

/// Talks to the queue backend. All business rules live there; this only shapes requests and
/// decodes responses into the typed model.
#[derive(Debug, Clone)]
pub struct QueueClient {
    http: Client,
    base: Url,
}

impl QueueClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base = Url::parse(trimmed)
            .map_err(|e| ApiError::Invalid(format!("Invalid backend URL {trimmed:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Invalid(format!(
                "Backend URL {trimmed:?} cannot have a path"
            )));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(QueueClient { http, base })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn event_url(&self, segments: &[&str], event_id: &str) -> Url {
        let mut url = self.url(segments);
        url.query_pairs_mut().append_pair("eventId", event_id);
        url
    }

    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<Value, ApiError> {
        debug!(%method, %url, "queue backend request");
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(CACHE_CONTROL, "no-store");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(%method, %url, status = status.as_u16(), body = %text, "queue backend error");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))?;
        if value.get("ok").and_then(Value::as_bool) == Some(false) {
            let message = message_field(&value).unwrap_or_else(|| GENERIC_FAILURE.to_string());
            warn!(%method, %url, %message, "queue backend rejected request");
            return Err(ApiError::Rejected(message));
        }
        Ok(value)
    }

    pub async fn board(&self, event_id: &str) -> Result<Board, ApiError> {
        let event_id = validate_id("Event id", event_id)?;
        let url = self.event_url(&["api", "board"], &event_id);
        let value = self.send(Method::GET, url, None).await?;
        Ok(normalize_board(&value))
    }

    pub async fn pool(&self, event_id: &str) -> Result<Pool, ApiError> {
        let event_id = validate_id("Event id", event_id)?;
        let url = self.event_url(&["api", "pool"], &event_id);
        let value = self.send(Method::GET, url, None).await?;
        Ok(Pool::from_value(&value))
    }

    pub async fn registrants(&self, query: &RegistrantQuery) -> Result<RegistrantPage, ApiError> {
        validate_id("Event id", &query.event_id)?;
        let mut url = self.url(&["api", "registrants"]);
        url.query_pairs_mut().extend_pairs(query.query_pairs());
        let value = self.send(Method::GET, url, None).await?;
        let (page, skipped) = RegistrantPage::from_value(&value, query);
        if skipped > 0 {
            warn!(skipped, "dropped registrant rows that did not decode");
        }
        Ok(page)
    }

    pub async fn register(&self, registration: &Registration) -> Result<RegisterOutcome, ApiError> {
        let registration = Registration::new(
            &registration.event_id,
            &registration.email,
            &registration.name,
            registration.wa.as_deref().unwrap_or_default(),
        )?;
        let body = serde_json::to_value(&registration)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let url = self.url(&["api", "register-request"]);
        let value = self.send(Method::POST, url, Some(body)).await?;
        Ok(RegisterOutcome::from_value(&value))
    }

    /// Confirms a pending registration, consuming `use_count` slots. Zero donates the
    /// registrant's quota without issuing a ticket.
    pub async fn confirm(
        &self,
        event_id: &str,
        request_id: &str,
        use_count: i64,
    ) -> Result<ActionOutcome, ApiError> {
        let use_count = validate_use_count(use_count)?;
        let request_id = validate_id("Request id", request_id)?;
        let event_id = validate_id("Event id", event_id)?;
        let body = json!({
            "requestId": request_id,
            "useCount": use_count,
            "eventId": event_id,
        });
        let url = self.url(&["api", "register-confirm"]);
        let value = self.send(Method::POST, url, Some(body)).await?;
        Ok(ActionOutcome::from_value(&value))
    }

    pub async fn donate(&self, event_id: &str, request_id: &str) -> Result<ActionOutcome, ApiError> {
        self.confirm(event_id, request_id, 0).await
    }

    pub async fn reject(
        &self,
        event_id: &str,
        request_id: &str,
        reason: &str,
    ) -> Result<ActionOutcome, ApiError> {
        let request_id = validate_id("Request id", request_id)?;
        let event_id = validate_id("Event id", event_id)?;
        let reason = match reason.trim() {
            "" => DEFAULT_REJECT_REASON,
            reason => reason,
        };
        let body = json!({
            "requestId": request_id,
            "eventId": event_id,
            "reason": reason,
        });
        let url = self.url(&["api", "register-reject"]);
        let value = self.send(Method::POST, url, Some(body)).await?;
        Ok(ActionOutcome::from_value(&value))
    }

    /// Moves the next `count` queued tickets into the active slots. Without a count the
    /// backend picks its own slot size.
    pub async fn call_next(
        &self,
        event_id: &str,
        count: Option<u32>,
    ) -> Result<ActionOutcome, ApiError> {
        let event_id = validate_id("Event id", event_id)?;
        let mut url = self.event_url(&["api", "call-next"], &event_id);
        if let Some(count) = count.filter(|c| *c > 0) {
            url.query_pairs_mut().append_pair("count", &count.to_string());
        }
        let value = self.send(Method::POST, url, None).await?;
        Ok(ActionOutcome::from_value(&value))
    }

    pub async fn promote(&self, event_id: &str) -> Result<ActionOutcome, ApiError> {
        let event_id = validate_id("Event id", event_id)?;
        let url = self.event_url(&["api", "promote"], &event_id);
        let value = self.send(Method::POST, url, None).await?;
        Ok(ActionOutcome::from_value(&value))
    }

    pub async fn ticket_action(
        &self,
        code: &str,
        action: TicketAction,
    ) -> Result<ActionOutcome, ApiError> {
        let code = validate_id("Ticket code", code)?;
        let url = self.url(&["api", "tickets", &code, action.path()]);
        let value = self.send(Method::PATCH, url, None).await?;
        Ok(ActionOutcome::from_value(&value))
    }

    pub async fn ticket_command(
        &self,
        event_id: &str,
        ticket_id: &str,
        command: TicketCommand,
    ) -> Result<ActionOutcome, ApiError> {
        let ticket_id = validate_id("Ticket id", ticket_id)?;
        let event_id = validate_id("Event id", event_id)?;
        let url = self.event_url(&["api", command.path(), &ticket_id], &event_id);
        let value = self.send(Method::POST, url, None).await?;
        Ok(ActionOutcome::from_value(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RegistrantSource, RequestStatus};
    use axum::{
        extract::State,
        http::{Method as HttpMethod, StatusCode, Uri},
        Router,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    struct Seen {
        method: String,
        uri: String,
        body: String,
    }

    type Reply = Arc<dyn Fn(&str) -> (StatusCode, String) + Send + Sync>;

    #[derive(Clone)]
    struct Backend {
        seen: Arc<Mutex<Vec<Seen>>>,
        reply: Reply,
    }

    async fn record(
        State(backend): State<Backend>,
        method: HttpMethod,
        uri: Uri,
        body: String,
    ) -> (StatusCode, String) {
        backend.seen.lock().unwrap().push(Seen {
            method: method.to_string(),
            uri: uri.to_string(),
            body,
        });
        (backend.reply)(uri.path())
    }

    /// Starts a fake backend answering every request through `reply`.
    async fn spawn_backend(
        reply: impl Fn(&str) -> (StatusCode, String) + Send + Sync + 'static,
    ) -> (QueueClient, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let backend = Backend {
            seen: seen.clone(),
            reply: Arc::new(reply),
        };
        let app = Router::new().fallback(record).with_state(backend);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = QueueClient::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
        (client, seen)
    }

    fn ok(body: Value) -> (StatusCode, String) {
        (StatusCode::OK, body.to_string())
    }

    #[tokio::test]
    async fn test_board_is_normalized() {
        let (client, seen) = spawn_backend(|_| {
            ok(json!({"active": [{"id": 1, "code": "AH001", "status": "CALLED"}], "next": [{"id": 2}]}))
        })
        .await;

        let board = client.board("ana event").await.unwrap();
        assert_eq!(board.active[0].label(), "AH001");
        assert_eq!(board.next_count, 1);
        assert!(board.queue.is_empty());
        assert!(board.totals.is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].uri, "/api/board?eventId=ana+event");
    }

    #[tokio::test]
    async fn test_confirm_sends_use_count() {
        let (client, seen) = spawn_backend(|_| {
            ok(json!({"ok": true, "tickets": [{"id": "t1", "code": "AH041"}, {"id": "t2", "code": "AH042"}]}))
        })
        .await;

        let outcome = client.confirm("seed-event", "req-1", 2).await.unwrap();
        assert_eq!(outcome.codes(), vec!["AH041", "AH042"]);

        let donated = client.donate("seed-event", "req-2").await.unwrap();
        assert_eq!(donated.tickets.len(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].uri, "/api/register-confirm");
        let body: Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(
            body,
            json!({"requestId": "req-1", "useCount": 2, "eventId": "seed-event"})
        );
        let body: Value = serde_json::from_str(&seen[1].body).unwrap();
        assert_eq!(body["useCount"], json!(0));
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_backend() {
        let (client, seen) = spawn_backend(|_| ok(json!({"ok": true}))).await;

        let err = client.confirm("seed-event", "req-1", -1).await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
        let err = client.confirm("seed-event", "  ", 1).await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
        let err = client.ticket_action("", TicketAction::Done).await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
        let err = client.board("").await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
        let registration = Registration {
            event_id: "seed-event".to_string(),
            email: " ".to_string(),
            name: "Ayu".to_string(),
            wa: None,
        };
        let err = client.register(&registration).await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ticket_paths_are_encoded() {
        let (client, seen) = spawn_backend(|_| ok(json!({"ok": true}))).await;

        client.ticket_action("AH 001/x", TicketAction::InProcess).await.unwrap();
        client
            .ticket_command("seed-event", "t-9", TicketCommand::Recall)
            .await
            .unwrap();
        client.call_next("seed-event", Some(6)).await.unwrap();
        client.call_next("seed-event", Some(0)).await.unwrap();
        client.promote("seed-event").await.unwrap();

        let seen = seen.lock().unwrap();
        let calls: Vec<(&str, &str)> = seen
            .iter()
            .map(|s| (s.method.as_str(), s.uri.as_str()))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("PATCH", "/api/tickets/AH%20001%2Fx/in-process"),
                ("POST", "/api/recall/t-9?eventId=seed-event"),
                ("POST", "/api/call-next?eventId=seed-event&count=6"),
                ("POST", "/api/call-next?eventId=seed-event"),
                ("POST", "/api/promote?eventId=seed-event"),
            ]
        );
    }

    #[tokio::test]
    async fn test_registrants_query() {
        let (client, seen) = spawn_backend(|_| {
            ok(json!({
                "ok": true,
                "items": [{
                    "id": "r1", "eventId": "seed-event", "email": "a@example.com", "name": "Ayu",
                    "source": "MASTER", "status": "PENDING", "masterQuota": 5, "issuedBefore": 7,
                }],
                "total": 1, "limit": 10, "offset": 0,
            }))
        })
        .await;

        let query = RegistrantQuery {
            event_id: "seed-event".to_string(),
            status: Some(RequestStatus::Pending),
            source: Some(RegistrantSource::Master),
            limit: 10,
            offset: 0,
            q: Some("ayu".to_string()),
        };
        let page = client.registrants(&query).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].quota_remaining, 0);

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0].uri,
            "/api/registrants?eventId=seed-event&status=PENDING&source=MASTER&limit=10&offset=0&q=ayu"
        );
    }

    #[tokio::test]
    async fn test_error_responses() {
        let (client, _) = spawn_backend(|path| match path {
            "/api/register-confirm" => (
                StatusCode::CONFLICT,
                json!({"ok": false, "error": "Pool exhausted"}).to_string(),
            ),
            "/api/register-reject" => ok(json!({"ok": false, "message": "Already confirmed"})),
            "/api/pool" => (StatusCode::OK, "<html>".to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
        })
        .await;

        let err = client.confirm("seed-event", "req-1", 1).await.unwrap_err();
        match &err {
            ApiError::Status { status, body } => {
                assert_eq!(*status, 409);
                assert!(body.contains("Pool exhausted"));
            }
            other => panic!("expected a status error, got {other:?}"),
        }
        assert_eq!(err.user_message(), "Pool exhausted");

        let err = client
            .reject("seed-event", "req-1", "Rejected from UI")
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Rejected("Already confirmed".to_string()));

        let err = client.pool("seed-event").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));

        let err = client.board("seed-event").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                status: 500,
                body: "boom".to_string()
            }
        );
        assert_eq!(err.user_message(), GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn test_reject_sends_a_reason() {
        let (client, seen) = spawn_backend(|_| ok(json!({"ok": true}))).await;

        client.reject("seed-event", "req-1", "  ").await.unwrap();
        client.reject("seed-event", "req-2", "Duplicate").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].uri, "/api/register-reject");
        let body: Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(
            body,
            json!({"requestId": "req-1", "eventId": "seed-event", "reason": "Rejected from UI"})
        );
        let body: Value = serde_json::from_str(&seen[1].body).unwrap();
        assert_eq!(body["reason"], json!("Duplicate"));
    }

    #[tokio::test]
    async fn test_register_outcome() {
        let (client, seen) = spawn_backend(|_| {
            ok(json!({"ok": true, "alreadyRegistered": true, "poolRemaining": 80}))
        })
        .await;

        let registration = Registration::new("seed-event", "a@example.com", "Ayu", "0812").unwrap();
        let outcome = client.register(&registration).await.unwrap();
        assert!(outcome.is_duplicate());
        assert_eq!(outcome.pool_remaining, Some(80));

        let seen = seen.lock().unwrap();
        let body: Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(
            body,
            json!({"eventId": "seed-event", "email": "a@example.com", "name": "Ayu", "wa": "0812"})
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = QueueClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = client.board("seed-event").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.user_message(), crate::error::UNREACHABLE);
    }

    #[test]
    fn test_base_url_with_prefix() {
        let client =
            QueueClient::new("https://example.com/queue/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url(&["api", "board"]).as_str(),
            "https://example.com/queue/api/board"
        );
        assert!(QueueClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(QueueClient::new("mailto:queue@example.com", Duration::from_secs(1)).is_err());
    }
}
