use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ApiError;

/// How many tickets "Call Next" moves into the active slots when nothing else is configured.
pub const DEFAULT_ACTIVE_SLOT_SIZE: u32 = 6;

/// Sent with a reject when the admin gives no reason.
pub const DEFAULT_REJECT_REASON: &str = "Rejected from UI";

// Everything but the RFC 3986 unreserved characters.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `path?event=<id>` with the id percent-encoded.
pub fn event_link(path: &str, event_id: &str) -> String {
    format!("{path}?event={}", utf8_percent_encode(event_id, QUERY_VALUE))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketStatus {
    Pending,
    Queued,
    Active,
    Called,
    InProcess,
    Done,
    Deferred,
    Skipped,
    NoShow,
    Cancelled,
    // Anything the backend invents later.
    Other(String),
}

impl TicketStatus {
    pub fn as_wire(&self) -> &str {
        match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Queued => "QUEUED",
            TicketStatus::Active => "ACTIVE",
            TicketStatus::Called => "CALLED",
            TicketStatus::InProcess => "IN_PROCESS",
            TicketStatus::Done => "DONE",
            TicketStatus::Deferred => "DEFERRED",
            TicketStatus::Skipped => "SKIPPED",
            TicketStatus::NoShow => "NO_SHOW",
            TicketStatus::Cancelled => "CANCELLED",
            TicketStatus::Other(s) => s,
        }
    }

    pub fn label(&self) -> String {
        match self {
            TicketStatus::Pending => "Pending".to_string(),
            TicketStatus::Queued => "Queued".to_string(),
            TicketStatus::Active => "Active".to_string(),
            TicketStatus::Called => "Called".to_string(),
            TicketStatus::InProcess => "In Process".to_string(),
            TicketStatus::Done => "Done".to_string(),
            TicketStatus::Deferred => "Deferred".to_string(),
            TicketStatus::Skipped => "Skipped".to_string(),
            TicketStatus::NoShow => "No Show".to_string(),
            TicketStatus::Cancelled => "Cancelled".to_string(),
            TicketStatus::Other(s) => s.replace('_', " "),
        }
    }
}

impl From<String> for TicketStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => TicketStatus::Pending,
            "QUEUED" => TicketStatus::Queued,
            "ACTIVE" => TicketStatus::Active,
            "CALLED" => TicketStatus::Called,
            "IN_PROCESS" => TicketStatus::InProcess,
            "DONE" => TicketStatus::Done,
            "DEFERRED" => TicketStatus::Deferred,
            "SKIPPED" => TicketStatus::Skipped,
            "NO_SHOW" => TicketStatus::NoShow,
            "CANCELLED" => TicketStatus::Cancelled,
            _ => TicketStatus::Other(s),
        }
    }
}

impl From<TicketStatus> for String {
    fn from(status: TicketStatus) -> Self {
        status.as_wire().to_string()
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub code: Option<String>,
    pub name: Option<String>,
    pub status: Option<TicketStatus>,
    pub order: Option<i64>,
    pub slot_no: Option<i64>,
    pub batch_no: Option<i64>,
    pub pos_in_batch: Option<i64>,
}

impl Ticket {
    /// Decodes one ticket from a backend payload. Only the shape is checked: any field may be
    /// missing, and `id` may arrive as a number. Returns None for non-objects.
    pub fn from_value(value: &Value) -> Option<Ticket> {
        let obj = value.as_object()?;
        Some(Ticket {
            id: text(obj, "id").unwrap_or_default(),
            code: text(obj, "code"),
            name: text(obj, "name"),
            status: text(obj, "status").map(TicketStatus::from),
            order: integer(obj, "order"),
            slot_no: integer(obj, "slotNo"),
            batch_no: integer(obj, "batchNo"),
            pos_in_batch: integer(obj, "posInBatch"),
        })
    }

    /// What to print for this ticket: the code, else the holder's name, else a short id.
    pub fn label(&self) -> String {
        if let Some(code) = self.code.as_ref().filter(|c| !c.is_empty()) {
            return code.clone();
        }
        if let Some(name) = self.name.as_ref().filter(|n| !n.is_empty()) {
            return name.clone();
        }
        self.id.chars().take(8).collect()
    }

    /// The identifier to use with code-addressed ticket endpoints.
    pub fn code_or_id(&self) -> String {
        self.code
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Displays "AH-001" as "AH001". Codes without the dash are returned unchanged.
pub fn compact_code(code: &str) -> String {
    code.replacen("AH-", "AH", 1)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_no: Option<i64>,
    pub items: Vec<Ticket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueueEntry {
    Batch(Batch),
    Ticket(Ticket),
}

impl QueueEntry {
    fn from_value(value: &Value) -> Option<QueueEntry> {
        let obj = value.as_object()?;
        let items = obj
            .get("items")
            .or_else(|| obj.get("tickets"))
            .and_then(Value::as_array);
        match items {
            Some(items) => Some(QueueEntry::Batch(Batch {
                batch_no: integer(obj, "batchNo"),
                items: items.iter().filter_map(Ticket::from_value).collect(),
            })),
            None => Ticket::from_value(value).map(QueueEntry::Ticket),
        }
    }
}

/// One point-in-time view of an event's queue. Every poll replaces it entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub active: Vec<Ticket>,
    pub next: Vec<Ticket>,
    pub queue: Vec<QueueEntry>,
    pub skip_grid: Vec<Ticket>,
    pub next_count: u64,
    pub totals: BTreeMap<String, i64>,
    pub last_update: Option<String>,
}

impl Board {
    /// All queued tickets, batches flattened, in backend order.
    pub fn queued_tickets(&self) -> Vec<Ticket> {
        self.queue
            .iter()
            .flat_map(|entry| match entry {
                QueueEntry::Batch(batch) => batch.items.clone(),
                QueueEntry::Ticket(ticket) => vec![ticket.clone()],
            })
            .collect()
    }

    /// Rows for the queue grid. Backend batches are kept as their own rows; loose tickets are
    /// grouped `width` to a row.
    pub fn queue_rows(&self, width: usize) -> Vec<Vec<Ticket>> {
        let width = width.max(1);
        let mut rows = Vec::new();
        let mut pending: Vec<Ticket> = Vec::new();
        for entry in &self.queue {
            match entry {
                QueueEntry::Ticket(ticket) => {
                    pending.push(ticket.clone());
                    if pending.len() == width {
                        rows.push(std::mem::take(&mut pending));
                    }
                }
                QueueEntry::Batch(batch) => {
                    if !pending.is_empty() {
                        rows.push(std::mem::take(&mut pending));
                    }
                    if !batch.items.is_empty() {
                        rows.push(batch.items.clone());
                    }
                }
            }
        }
        if !pending.is_empty() {
            rows.push(pending);
        }
        rows
    }
}

/// Turns whatever the backend sent for a board into a `Board`. Never fails: missing or
/// malformed parts come back empty, so rendering code never has to check for absence.
pub fn normalize_board(raw: &Value) -> Board {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let next = tickets(obj, "next");
    let next_count = obj
        .get("nextCount")
        .and_then(lenient_i64)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(next.len() as u64);

    // Older backends call the queue "queued".
    let queue = obj
        .get("queue")
        .and_then(Value::as_array)
        .or_else(|| obj.get("queued").and_then(Value::as_array))
        .map(|entries| entries.iter().filter_map(QueueEntry::from_value).collect())
        .unwrap_or_default();

    let totals = obj
        .get("totals")
        .and_then(Value::as_object)
        .map(|totals| {
            totals
                .iter()
                .filter_map(|(key, value)| lenient_i64(value).map(|n| (key.clone(), n)))
                .collect()
        })
        .unwrap_or_default();

    Board {
        active: tickets(obj, "active"),
        next,
        queue,
        skip_grid: tickets(obj, "skipGrid"),
        next_count,
        totals,
        last_update: text(obj, "lastUpdate").or_else(|| text(obj, "ts")),
    }
}

fn tickets(obj: &Map<String, Value>, key: &str) -> Vec<Ticket> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Ticket::from_value).collect())
        .unwrap_or_default()
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    obj.get(key).and_then(lenient_i64)
}

/// Numbers (finite, truncated) and numeric strings.
pub(crate) fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrantSource {
    Master,
    Walkin,
    Gimmick,
}

impl RegistrantSource {
    pub const ALL: [RegistrantSource; 3] = [
        RegistrantSource::Master,
        RegistrantSource::Walkin,
        RegistrantSource::Gimmick,
    ];

    pub fn as_wire(&self) -> &'static str {
        match self {
            RegistrantSource::Master => "MASTER",
            RegistrantSource::Walkin => "WALKIN",
            RegistrantSource::Gimmick => "GIMMICK",
        }
    }

    /// Parses a filter value; "ALL" (or anything unknown) means no filter.
    pub fn from_filter(s: &str) -> Option<RegistrantSource> {
        Self::ALL.into_iter().find(|source| source.as_wire() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::Confirmed,
        RequestStatus::Cancelled,
    ];

    pub fn as_wire(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Confirmed => "CONFIRMED",
            RequestStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_filter(s: &str) -> Option<RequestStatus> {
        Self::ALL.into_iter().find(|status| status.as_wire() == s)
    }
}

/// A registration request as the admin pages see it. `quota_remaining` is always filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registrant {
    pub id: String,
    pub event_id: String,
    pub email: String,
    pub name: String,
    pub wa: Option<String>,
    pub source: RegistrantSource,
    pub status: RequestStatus,
    pub is_master_match: Option<bool>,
    pub master_quota: Option<i64>,
    pub issued_before: Option<i64>,
    pub quota_remaining: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// The backend's row, before quota derivation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrantRow {
    #[serde(deserialize_with = "lenient_id")]
    id: String,
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    wa: Option<String>,
    source: RegistrantSource,
    status: RequestStatus,
    #[serde(default)]
    is_master_match: Option<bool>,
    #[serde(default)]
    master_quota: Option<i64>,
    #[serde(default)]
    issued_before: Option<i64>,
    #[serde(default)]
    quota_remaining: Option<i64>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

impl From<RegistrantRow> for Registrant {
    fn from(row: RegistrantRow) -> Self {
        let quota_remaining =
            derive_quota_remaining(row.quota_remaining, row.master_quota, row.issued_before);
        Registrant {
            id: row.id,
            event_id: row.event_id,
            email: row.email,
            name: row.name,
            wa: row.wa.filter(|wa| !wa.is_empty()),
            source: row.source,
            status: row.status,
            is_master_match: row.is_master_match,
            master_quota: row.master_quota,
            issued_before: row.issued_before,
            quota_remaining,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl Registrant {
    pub fn from_value(value: &Value) -> Result<Registrant, serde_json::Error> {
        RegistrantRow::deserialize(value).map(Registrant::from)
    }
}

/// Remaining quota for display. An explicit value from the backend wins; otherwise it is
/// `master_quota - issued_before`. Never negative.
pub fn derive_quota_remaining(
    explicit: Option<i64>,
    master_quota: Option<i64>,
    issued_before: Option<i64>,
) -> i64 {
    explicit
        .unwrap_or_else(|| master_quota.unwrap_or(0) - issued_before.unwrap_or(0))
        .max(0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrantPage {
    pub items: Vec<Registrant>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl RegistrantPage {
    /// Decodes a `{ok, items, total, limit, offset}` list response. Rows that fail to decode
    /// are dropped and counted in the second element.
    pub fn from_value(value: &Value, query: &RegistrantQuery) -> (RegistrantPage, usize) {
        let rows = value
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut skipped = 0;
        let items: Vec<Registrant> = rows
            .iter()
            .filter_map(|row| match Registrant::from_value(row) {
                Ok(registrant) => Some(registrant),
                Err(_) => {
                    skipped += 1;
                    None
                }
            })
            .collect();
        let field = |key: &str| value.get(key).and_then(lenient_i64);
        let page = RegistrantPage {
            total: field("total").unwrap_or(items.len() as i64),
            limit: field("limit")
                .filter(|l| *l > 0)
                .unwrap_or(query.limit as i64),
            offset: field("offset").unwrap_or(query.offset as i64),
            items,
        };
        (page, skipped)
    }
}

/// Returns `(page, max_page)`, both 1-based. `max_page` is at least 1.
pub fn page_info(total: i64, limit: i64, offset: i64) -> (i64, i64) {
    let limit = limit.max(1);
    let total = total.max(0);
    let max_page = (total / limit + i64::from(total % limit != 0)).max(1);
    let page = (offset.max(0) / limit).saturating_add(1);
    (page, max_page)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrantQuery {
    pub event_id: String,
    pub status: Option<RequestStatus>,
    pub source: Option<RegistrantSource>,
    pub limit: u32,
    pub offset: u32,
    pub q: Option<String>,
}

impl RegistrantQuery {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("eventId", self.event_id.clone()),
            (
                "status",
                self.status.map_or("ALL", |s| s.as_wire()).to_string(),
            ),
            (
                "source",
                self.source.map_or("ALL", |s| s.as_wire()).to_string(),
            ),
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            pairs.push(("q", q.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub pool_remaining: Option<i64>,
}

impl Pool {
    pub fn from_value(value: &Value) -> Pool {
        Pool {
            pool_remaining: value.get("poolRemaining").and_then(lenient_i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub event_id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wa: Option<String>,
}

impl Registration {
    /// Trims every field and checks the required ones.
    pub fn new(event_id: &str, email: &str, name: &str, wa: &str) -> Result<Registration, ApiError> {
        let email = email.trim();
        let name = name.trim();
        if email.is_empty() || name.is_empty() {
            return Err(ApiError::Invalid(
                "Email and full name are required.".to_string(),
            ));
        }
        let wa = wa.trim();
        Ok(Registration {
            event_id: validate_id("Event id", event_id)?,
            email: email.to_string(),
            name: name.to_string(),
            wa: (!wa.is_empty()).then(|| wa.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOutcome {
    pub dedup: bool,
    pub already_registered: bool,
    pub request: Option<Registrant>,
    pub pool_remaining: Option<i64>,
}

impl RegisterOutcome {
    pub fn from_value(value: &Value) -> RegisterOutcome {
        let flag = |key: &str| value.get(key).and_then(Value::as_bool).unwrap_or(false);
        RegisterOutcome {
            dedup: flag("dedup"),
            already_registered: flag("alreadyRegistered"),
            request: value
                .get("request")
                .and_then(|r| Registrant::from_value(r).ok()),
            pool_remaining: value.get("poolRemaining").and_then(lenient_i64),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.dedup || self.already_registered
    }
}

/// What a mutation echoed back: an optional message and any tickets it touched or issued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub message: Option<String>,
    pub tickets: Vec<Ticket>,
}

impl ActionOutcome {
    pub fn from_value(value: &Value) -> ActionOutcome {
        let tickets = match value.get("tickets").and_then(Value::as_array) {
            Some(items) => items.iter().filter_map(Ticket::from_value).collect(),
            None => value
                .get("ticket")
                .and_then(Ticket::from_value)
                .into_iter()
                .collect(),
        };
        ActionOutcome {
            message: value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            tickets,
        }
    }

    pub fn codes(&self) -> Vec<String> {
        self.tickets
            .iter()
            .filter_map(|t| t.code.clone())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

/// Code-addressed ticket transitions (`PATCH /api/tickets/{code}/{action}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketAction {
    Call,
    InProcess,
    Done,
    Skip,
}

impl TicketAction {
    pub fn path(&self) -> &'static str {
        match self {
            TicketAction::Call => "call",
            TicketAction::InProcess => "in-process",
            TicketAction::Done => "done",
            TicketAction::Skip => "skip",
        }
    }

    pub fn from_path(path: &str) -> Option<TicketAction> {
        [
            TicketAction::Call,
            TicketAction::InProcess,
            TicketAction::Done,
            TicketAction::Skip,
        ]
        .into_iter()
        .find(|action| action.path() == path)
    }
}

/// Id-addressed ticket transitions (`POST /api/{command}/{id}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketCommand {
    Recall,
    Skip,
    Done,
}

impl TicketCommand {
    pub fn path(&self) -> &'static str {
        match self {
            TicketCommand::Recall => "recall",
            TicketCommand::Skip => "skip",
            TicketCommand::Done => "done",
        }
    }

    pub fn from_path(path: &str) -> Option<TicketCommand> {
        [TicketCommand::Recall, TicketCommand::Skip, TicketCommand::Done]
            .into_iter()
            .find(|command| command.path() == path)
    }
}

/// Returns the trimmed identifier, or an error naming `what` when it is blank.
pub fn validate_id(what: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Invalid(format!("{what} is required.")));
    }
    Ok(value.to_string())
}

/// Zero is allowed: it confirms the request and donates the quota without issuing a ticket.
pub fn validate_use_count(use_count: i64) -> Result<u32, ApiError> {
    u32::try_from(use_count)
        .map_err(|_| ApiError::Invalid("Slot count must be zero or more.".to_string()))
}
