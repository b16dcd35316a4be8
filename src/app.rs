use gloo_timers::future::TimeoutFuture;
use leptos::ev::SubmitEvent;
use leptos::logging::warn;
use leptos::prelude::*;
use leptos::server_fn::error::NoCustomError;
use leptos::task::spawn_local;
use leptos_meta::{provide_meta_context, MetaTags, Stylesheet, Title};
use leptos_router::{
    components::{Route, Router, Routes},
    path,
};
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::components::{
    provide_toasts, use_toasts, BoardView, NextTicker, QrBlock, QueueCard, StatusBadge,
    ToastKind, ToastStack, Toasts,
};
use crate::error::error_text;
use crate::hooks::{use_board, use_event_id, use_pool, PollHandle, ADMIN_POLL, POOL_POLL, TV_POLL};
use crate::model::{
    event_link, page_info, validate_use_count, ActionOutcome, Board, Pool, RegisterOutcome, RegistrantPage,
    RegistrantSource, RequestStatus, Ticket, TicketAction, TicketCommand, TicketStatus,
    DEFAULT_ACTIVE_SLOT_SIZE, DEFAULT_REJECT_REASON,
};

#[cfg(feature = "ssr")]
use crate::{client::QueueClient, config::Config, error::ApiError};

const PRIME_ROUNDS: usize = 5;
const PRIME_GAP_MS: u32 = 300;
const PAGE_SIZES: [u32; 4] = [10, 20, 50, 100];
const DEFAULT_PAGE_SIZE: u32 = 10;

/// What the browser needs to know about the server's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub event_id: String,
    pub active_slot_size: u32,
    pub register_url: String,
}

#[cfg(feature = "ssr")]
fn backend() -> (Config, QueueClient) {
    (expect_context(), expect_context())
}

// The full error stays in the server log; the browser only gets the user-facing text.
#[cfg(feature = "ssr")]
fn to_server_error(e: ApiError) -> ServerFnError<NoCustomError> {
    tracing::warn!(error = %e, "queue backend call failed");
    ServerFnError::ServerError(e.user_message())
}

#[server(GetSettings)]
pub async fn get_settings(
    event_id: Option<String>,
) -> Result<ClientSettings, ServerFnError<NoCustomError>> {
    let (config, _) = backend();
    let event_id = config.event_id(event_id);
    Ok(ClientSettings {
        register_url: config.register_url(&event_id),
        active_slot_size: config.active_slot_size,
        event_id,
    })
}

#[server(GetBoard)]
pub async fn get_board(event_id: Option<String>) -> Result<Board, ServerFnError<NoCustomError>> {
    let (config, client) = backend();
    client
        .board(&config.event_id(event_id))
        .await
        .map_err(to_server_error)
}

#[server(GetPool)]
pub async fn get_pool(event_id: Option<String>) -> Result<Pool, ServerFnError<NoCustomError>> {
    let (config, client) = backend();
    client
        .pool(&config.event_id(event_id))
        .await
        .map_err(to_server_error)
}

/// `status` and `source` take the wire names, or "ALL" for no filter.
#[server(GetRegistrants)]
pub async fn get_registrants(
    event_id: Option<String>,
    status: String,
    source: String,
    limit: u32,
    offset: u32,
    q: String,
) -> Result<RegistrantPage, ServerFnError<NoCustomError>> {
    use crate::model::RegistrantQuery;

    let (config, client) = backend();
    let query = RegistrantQuery {
        event_id: config.event_id(event_id),
        status: RequestStatus::from_filter(&status),
        source: RegistrantSource::from_filter(&source),
        limit: limit.clamp(1, 100),
        offset,
        q: Some(q.trim().to_string()).filter(|q| !q.is_empty()),
    };
    client.registrants(&query).await.map_err(to_server_error)
}

#[server(SubmitRegistration)]
pub async fn submit_registration(
    event_id: Option<String>,
    email: String,
    name: String,
    wa: String,
) -> Result<RegisterOutcome, ServerFnError<NoCustomError>> {
    use crate::model::Registration;

    let (config, client) = backend();
    let registration = Registration::new(&config.event_id(event_id), &email, &name, &wa)
        .map_err(to_server_error)?;
    client
        .register(&registration)
        .await
        .map_err(to_server_error)
}

#[server(ConfirmRegistration)]
pub async fn confirm_registration(
    event_id: Option<String>,
    request_id: String,
    use_count: i64,
) -> Result<ActionOutcome, ServerFnError<NoCustomError>> {
    let (config, client) = backend();
    client
        .confirm(&config.event_id(event_id), &request_id, use_count)
        .await
        .map_err(to_server_error)
}

#[server(RejectRegistration)]
pub async fn reject_registration(
    event_id: Option<String>,
    request_id: String,
    reason: String,
) -> Result<ActionOutcome, ServerFnError<NoCustomError>> {
    let (config, client) = backend();
    client
        .reject(&config.event_id(event_id), &request_id, &reason)
        .await
        .map_err(to_server_error)
}

#[server(CallNext)]
pub async fn call_next(
    event_id: Option<String>,
    count: Option<u32>,
) -> Result<ActionOutcome, ServerFnError<NoCustomError>> {
    let (config, client) = backend();
    client
        .call_next(&config.event_id(event_id), count)
        .await
        .map_err(to_server_error)
}

#[server(Promote)]
pub async fn promote(event_id: Option<String>) -> Result<ActionOutcome, ServerFnError<NoCustomError>> {
    let (config, client) = backend();
    client
        .promote(&config.event_id(event_id))
        .await
        .map_err(to_server_error)
}

/// `action` is one of the code-addressed transitions: call, in-process, done, skip.
#[server(UpdateTicket)]
pub async fn update_ticket(
    code: String,
    action: String,
) -> Result<ActionOutcome, ServerFnError<NoCustomError>> {
    let action = TicketAction::from_path(&action)
        .ok_or_else(|| {
            ServerFnError::<NoCustomError>::ServerError(format!("Unknown ticket action: {action}"))
        })?;
    let (_, client) = backend();
    client
        .ticket_action(&code, action)
        .await
        .map_err(to_server_error)
}

/// `command` is one of the id-addressed transitions: recall, skip, done.
#[server(RunTicketCommand)]
pub async fn run_ticket_command(
    event_id: Option<String>,
    ticket_id: String,
    command: String,
) -> Result<ActionOutcome, ServerFnError<NoCustomError>> {
    let command = TicketCommand::from_path(&command)
        .ok_or_else(|| {
            ServerFnError::<NoCustomError>::ServerError(format!("Unknown ticket command: {command}"))
        })?;
    let (config, client) = backend();
    client
        .ticket_command(&config.event_id(event_id), &ticket_id, command)
        .await
        .map_err(to_server_error)
}

pub fn shell(options: LeptosOptions) -> impl IntoView {
    view! {
        <!DOCTYPE html>
        <html lang="en">
            <head>
                <meta charset="utf-8" />
                <meta name="viewport" content="width=device-width, initial-scale=1" />
                <AutoReload options=options.clone() />
                <HydrationScripts options />
                <MetaTags />
            </head>
            <body>
                <App />
            </body>
        </html>
    }
}

#[component]
pub fn App() -> impl IntoView {
    // Provides context that manages stylesheets, titles, meta tags, etc.
    provide_meta_context();
    provide_toasts();

    view! {
        <Stylesheet id="leptos" href="/pkg/ana-queue.css" />

        <Title text="Ana Book Signing Queue" />

        <Router>
            <main>
                <Routes fallback=|| "Page not found.".into_view()>
                    <Route path=path!("/") view=Home />
                    <Route path=path!("/register") view=Register />
                    <Route path=path!("/admin/approve") view=AdminApprove />
                    <Route path=path!("/admin") view=AdminQueue />
                    <Route path=path!("/tv") view=Tv />
                </Routes>
            </main>
            <ToastStack />
        </Router>
    }
}

/// Keeps the `?event=` override on links between pages.
fn with_event(path: &str, event_id: Option<&str>) -> String {
    match event_id {
        Some(id) => event_link(path, id),
        None => path.to_string(),
    }
}

/// Toast text for a finished mutation: the touched ticket codes when there are any, else
/// whatever the backend said, else `done` on its own.
fn outcome_text(done: &str, outcome: &ActionOutcome) -> String {
    let codes = outcome.codes();
    if !codes.is_empty() {
        return format!("{done}: {}", codes.join(", "));
    }
    match outcome.message.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => format!("{done}. {message}"),
        _ => done.to_string(),
    }
}

#[component]
fn Home() -> impl IntoView {
    let event_id = use_event_id();
    let link = move |path: &str| with_event(path, event_id.as_deref());

    view! {
        <div class="page home">
            <h1>"Ana Book Signing"</h1>
            <ul class="nav-list">
                <li>
                    <a href=link("/register")>"Register"</a>
                </li>
                <li>
                    <a href=link("/tv")>"Queue display"</a>
                </li>
                <li>
                    <a href=link("/admin")>"Queue control"</a>
                </li>
                <li>
                    <a href=link("/admin/approve")>"Approve registrations"</a>
                </li>
            </ul>
        </div>
    }
}

#[component]
fn Register() -> impl IntoView {
    let event_id = StoredValue::new(use_event_id());
    let toasts = use_toasts();

    // Signals related to the registration form.
    let email = RwSignal::new(String::new());
    let name = RwSignal::new(String::new());
    let wa = RwSignal::new(String::new());
    let submitting = RwSignal::new(false);

    let submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        if submitting.get_untracked() {
            return;
        }
        let (email_value, name_value, wa_value) = (email.get(), name.get(), wa.get());
        if email_value.trim().is_empty() || name_value.trim().is_empty() {
            toasts.push(ToastKind::Error, "Email and full name are required.");
            return;
        }
        submitting.set(true);
        spawn_local(async move {
            match submit_registration(event_id.get_value(), email_value, name_value, wa_value).await
            {
                Ok(outcome) => {
                    if outcome.is_duplicate() {
                        toasts.push(
                            ToastKind::Info,
                            "You are already registered. Please wait for confirmation.",
                        );
                    } else {
                        toasts.push(
                            ToastKind::Success,
                            "Registration received. We will confirm your slot soon.",
                        );
                    }
                    email.set(String::new());
                    name.set(String::new());
                    wa.set(String::new());
                }
                Err(e) => {
                    warn!("Registration failed: {e}");
                    toasts.push(ToastKind::Error, error_text(&e.to_string()));
                }
            }
            let _ = submitting.try_set(false);
        });
    };

    view! {
        <div class="page register">
            <h1>"Register for the signing"</h1>
            <form class="card" on:submit=submit>
                <label>
                    "Email"
                    <input
                        type="email"
                        prop:value=email
                        on:input=move |ev| email.set(event_target_value(&ev))
                    />
                </label>
                <label>
                    "Full name"
                    <input
                        type="text"
                        prop:value=name
                        on:input=move |ev| name.set(event_target_value(&ev))
                    />
                </label>
                <label>
                    "WhatsApp (optional)"
                    <input
                        type="tel"
                        prop:value=wa
                        on:input=move |ev| wa.set(event_target_value(&ev))
                    />
                </label>
                <button type="submit" disabled=move || submitting.get()>
                    {move || if submitting.get() { "Sending..." } else { "Register" }}
                </button>
            </form>
        </div>
    }
}

#[component]
fn AdminApprove() -> impl IntoView {
    let event_id = StoredValue::new(use_event_id());
    let toasts = use_toasts();
    let pool = use_pool(event_id.get_value(), POOL_POLL);

    // Signals related to filtering and paging the registrant list.
    let status_filter = RwSignal::new(RequestStatus::Pending.as_wire().to_string());
    let source_filter = RwSignal::new("ALL".to_string());
    let search_input = RwSignal::new(String::new());
    let search = RwSignal::new(String::new());
    let limit = RwSignal::new(DEFAULT_PAGE_SIZE);
    let offset = RwSignal::new(0u32);

    let registrants = Resource::new(
        move || {
            (
                status_filter.get(),
                source_filter.get(),
                search.get(),
                limit.get(),
                offset.get(),
            )
        },
        move |(status, source, q, limit, offset)| {
            get_registrants(event_id.get_value(), status, source, limit, offset, q)
        },
    );

    // Signals related to the confirm dialog.
    let confirming = RwSignal::new(None::<(String, String)>);
    let use_count = RwSignal::new("1".to_string());
    let busy = RwSignal::new(false);

    let after_change = move || {
        registrants.refetch();
        pool.refresh();
    };

    let search_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        offset.set(0);
        search.set(search_input.get());
    };

    let confirm_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let Some((request_id, _)) = confirming.get() else {
            return;
        };
        let count = match use_count.get().trim().parse::<i64>() {
            Ok(count) => count,
            Err(_) => {
                toasts.push(ToastKind::Error, "Slot count must be a whole number.");
                return;
            }
        };
        if let Err(e) = validate_use_count(count) {
            toasts.push(ToastKind::Error, e.user_message());
            return;
        }
        busy.set(true);
        spawn_local(async move {
            match confirm_registration(event_id.get_value(), request_id, count).await {
                Ok(outcome) => {
                    let done = if count == 0 {
                        "Quota donated to the pool"
                    } else {
                        "Confirmed"
                    };
                    toasts.push(ToastKind::Success, outcome_text(done, &outcome));
                    let _ = confirming.try_set(None);
                }
                Err(e) => toasts.push(ToastKind::Error, error_text(&e.to_string())),
            }
            if busy.try_update(|b| *b = false).is_some() {
                after_change();
            }
        });
    };

    let reject = move |request_id: String| {
        if !leptos::leptos_dom::helpers::window()
            .confirm_with_message("Reject this registration?")
            .unwrap_or(false)
        {
            return;
        }
        busy.set(true);
        spawn_local(async move {
            match reject_registration(
                event_id.get_value(),
                request_id,
                DEFAULT_REJECT_REASON.to_string(),
            ).await {
                Ok(outcome) => toasts.push(ToastKind::Info, outcome_text("Rejected", &outcome)),
                Err(e) => toasts.push(ToastKind::Error, error_text(&e.to_string())),
            }
            if busy.try_update(|b| *b = false).is_some() {
                after_change();
            }
        });
    };

    view! {
        <div class="page admin-approve">
            <header class="page-head">
                <h1>"Registrations"</h1>
                <span class="pool-badge">
                    {move || match pool.with_data(|p| p.pool_remaining) {
                        Some(n) => format!("Pool remaining: {n}"),
                        None => "Pool remaining: -".to_string(),
                    }}
                </span>
            </header>

            <div class="filters">
                <select
                    prop:value=status_filter
                    on:change=move |ev| {
                        offset.set(0);
                        status_filter.set(event_target_value(&ev));
                    }
                >
                    {RequestStatus::ALL
                        .iter()
                        .map(|s| view! { <option value=s.as_wire()>{s.as_wire()}</option> })
                        .collect_view()}
                    <option value="ALL">"ALL"</option>
                </select>
                <select
                    prop:value=source_filter
                    on:change=move |ev| {
                        offset.set(0);
                        source_filter.set(event_target_value(&ev));
                    }
                >
                    <option value="ALL">"ALL"</option>
                    {RegistrantSource::ALL
                        .iter()
                        .map(|s| view! { <option value=s.as_wire()>{s.as_wire()}</option> })
                        .collect_view()}
                </select>
                <form on:submit=search_submit>
                    <input
                        type="search"
                        placeholder="Search name, email or WA"
                        prop:value=search_input
                        on:input=move |ev| search_input.set(event_target_value(&ev))
                    />
                    <button type="submit">"Search"</button>
                </form>
                <select
                    prop:value=move || limit.get().to_string()
                    on:change=move |ev| {
                        if let Ok(size) = event_target_value(&ev).parse::<u32>() {
                            offset.set(0);
                            limit.set(size);
                        }
                    }
                >
                    {PAGE_SIZES
                        .iter()
                        .map(|n| view! { <option value=n.to_string()>{format!("{n} / page")}</option> })
                        .collect_view()}
                </select>
            </div>

            <Suspense fallback=|| {
                view! { "Loading..." }
            }>
                {move || {
                    registrants
                        .with(|res| match res {
                            Some(Ok(page)) => {
                                let (current, max_page) = page_info(page.total, page.limit, page.offset);
                                let step = page.limit.max(1) as u32;
                                view! {
                                    <table class="registrants">
                                        <thead>
                                            <tr>
                                                <th>"Name"</th>
                                                <th>"Email"</th>
                                                <th>"WA"</th>
                                                <th>"Source"</th>
                                                <th>"Status"</th>
                                                <th>"Quota"</th>
                                                <th>"Registered"</th>
                                                <th></th>
                                            </tr>
                                        </thead>
                                        <tbody>
                                            {page
                                                .items
                                                .iter()
                                                .map(|r| {
                                                    let pending = r.status == RequestStatus::Pending;
                                                    let quota = (r.source == RegistrantSource::Master)
                                                        .then(|| r.quota_remaining.to_string())
                                                        .unwrap_or_else(|| "-".to_string());
                                                    let created = r
                                                        .created_at
                                                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                                                        .unwrap_or_default();
                                                    let confirm_target = (r.id.clone(), r.name.clone());
                                                    let reject_id = r.id.clone();
                                                    view! {
                                                        <tr>
                                                            <td>{r.name.clone()}</td>
                                                            <td>{r.email.clone()}</td>
                                                            <td>{r.wa.clone().unwrap_or_default()}</td>
                                                            <td>{r.source.as_wire()}</td>
                                                            <td>
                                                                <span class="badge">{r.status.as_wire()}</span>
                                                            </td>
                                                            <td>{quota}</td>
                                                            <td>{created}</td>
                                                            <td class="actions">
                                                                {pending
                                                                    .then(|| {
                                                                        view! {
                                                                            <button on:click=move |_| {
                                                                                use_count.set("1".to_string());
                                                                                confirming.set(Some(confirm_target.clone()));
                                                                            }>"Confirm"</button>
                                                                            <button
                                                                                class="danger"
                                                                                disabled=move || busy.get()
                                                                                on:click=move |_| reject(reject_id.clone())
                                                                            >
                                                                                "Reject"
                                                                            </button>
                                                                        }
                                                                    })}
                                                            </td>
                                                        </tr>
                                                    }
                                                })
                                                .collect_view()}
                                        </tbody>
                                    </table>
                                    <div class="pager">
                                        <button
                                            disabled=current <= 1
                                            on:click=move |_| offset.update(|o| *o = o.saturating_sub(step))
                                        >
                                            "Prev"
                                        </button>
                                        <span>{format!("Page {current} of {max_page} ({} total)", page.total)}</span>
                                        <button
                                            disabled=current >= max_page
                                            on:click=move |_| offset.update(|o| *o = o.saturating_add(step))
                                        >
                                            "Next"
                                        </button>
                                    </div>
                                }
                                    .into_any()
                            }
                            Some(Err(e)) => {
                                view! { <p class="error">{error_text(&e.to_string())}</p> }.into_any()
                            }
                            None => view! {}.into_any(),
                        })
                }}
            </Suspense>

            {move || {
                confirming
                    .get()
                    .map(|(_, name)| {
                        view! {
                            <div class="dialog-backdrop">
                                <form class="dialog card" on:submit=confirm_submit>
                                    <h2>{format!("Confirm {name}")}</h2>
                                    <label>
                                        "Slots to use (0 donates the quota)"
                                        <input
                                            type="number"
                                            min="0"
                                            prop:value=use_count
                                            on:input=move |ev| use_count.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <div class="dialog-actions">
                                        <button type="button" on:click=move |_| confirming.set(None)>
                                            "Cancel"
                                        </button>
                                        <button type="submit" disabled=move || busy.get()>
                                            "Confirm"
                                        </button>
                                    </div>
                                </form>
                            </div>
                        }
                    })
            }}
        </div>
    }
}

/// Runs one queue mutation: toasts the outcome, then resyncs the board. Ignored while another
/// mutation is still in flight.
fn run_action<F>(busy: RwSignal<bool>, toasts: Toasts, board: PollHandle<Board>, done: &'static str, action: F)
where
    F: Future<Output = Result<ActionOutcome, ServerFnError<NoCustomError>>> + 'static,
{
    if busy.get_untracked() {
        return;
    }
    busy.set(true);
    spawn_local(async move {
        match action.await {
            Ok(outcome) => toasts.push(ToastKind::Success, outcome_text(done, &outcome)),
            Err(e) => {
                warn!("{done} failed: {e}");
                toasts.push(ToastKind::Error, error_text(&e.to_string()));
            }
        }
        if busy.try_update(|b| *b = false).is_some() {
            board.refresh();
        }
    });
}

/// Calls the next `count` tickets. If the backend can't, calls the tickets the board last
/// showed as next, one by one by code.
async fn call_next_with_fallback(
    event_id: Option<String>,
    count: u32,
    fallback: Vec<String>,
) -> Result<ActionOutcome, ServerFnError<NoCustomError>> {
    let err = match call_next(event_id, Some(count)).await {
        Ok(outcome) => return Ok(outcome),
        Err(e) => e,
    };
    if fallback.is_empty() {
        return Err(err);
    }
    warn!("Call next failed, calling {} tickets by code: {err}", fallback.len());
    let mut tickets = Vec::new();
    for code in fallback {
        let outcome = update_ticket(code, TicketAction::Call.path().to_string()).await?;
        tickets.extend(outcome.tickets);
    }
    Ok(ActionOutcome {
        message: None,
        tickets,
    })
}

/// Several rounds of call-next, used to fill the active slots at the start of a session.
async fn prime(
    event_id: Option<String>,
    count: u32,
) -> Result<ActionOutcome, ServerFnError<NoCustomError>> {
    let mut tickets = Vec::new();
    for round in 0..PRIME_ROUNDS {
        if round > 0 {
            TimeoutFuture::new(PRIME_GAP_MS).await;
        }
        let outcome = call_next(event_id.clone(), Some(count)).await?;
        tickets.extend(outcome.tickets);
    }
    Ok(ActionOutcome {
        message: None,
        tickets,
    })
}

#[component]
fn AdminQueue() -> impl IntoView {
    let event_id = StoredValue::new(use_event_id());
    let toasts = use_toasts();
    let board = use_board(event_id.get_value(), ADMIN_POLL);
    let settings = Resource::new(|| (), move |_| get_settings(event_id.get_value()));
    let busy = RwSignal::new(false);
    let code_input = RwSignal::new(String::new());

    let slot_size = move || {
        settings
            .get()
            .and_then(Result::ok)
            .map(|s| s.active_slot_size)
            .unwrap_or(DEFAULT_ACTIVE_SLOT_SIZE)
    };

    let call_next_click = move |_| {
        let count = slot_size();
        let fallback: Vec<String> = board.with_data(|b| {
            b.next
                .iter()
                .take(count as usize)
                .map(Ticket::code_or_id)
                .collect()
        });
        run_action(
            busy,
            toasts,
            board,
            "Called",
            call_next_with_fallback(event_id.get_value(), count, fallback),
        );
    };

    let ticket_click = move |code: String, action: TicketAction, done: &'static str| {
        run_action(
            busy,
            toasts,
            board,
            done,
            update_ticket(code, action.path().to_string()),
        );
    };

    let command_click = move |ticket_id: String, command: TicketCommand, done: &'static str| {
        run_action(
            busy,
            toasts,
            board,
            done,
            run_ticket_command(event_id.get_value(), ticket_id, command.path().to_string()),
        );
    };

    let call_code_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let code = code_input.get().trim().to_uppercase();
        if code.is_empty() {
            toasts.push(ToastKind::Error, "Enter a ticket code.");
            return;
        }
        code_input.set(String::new());
        ticket_click(code, TicketAction::Call, "Called");
    };

    view! {
        <div class="page admin-queue">
            <header class="page-head">
                <h1>"Queue control"</h1>
                <span class="count">{move || format!("In line: {}", board.with_data(|b| b.next_count))}</span>
                {move || board.error().map(|e| view! { <span class="stale" title=e>"Offline"</span> })}
            </header>

            <Suspense>
                <div class="toolbar">
                    <button disabled=move || busy.get() on:click=call_next_click>
                        {move || format!("Call Next {}", slot_size())}
                    </button>
                    <button
                        disabled=move || busy.get()
                        on:click=move |_| {
                            run_action(busy, toasts, board, "Primed", prime(event_id.get_value(), slot_size()))
                        }
                    >
                        "Prime"
                    </button>
                    <button
                        disabled=move || busy.get()
                        on:click=move |_| run_action(busy, toasts, board, "Promoted", promote(event_id.get_value()))
                    >
                        "Promote"
                    </button>
                    <form class="inline" on:submit=call_code_submit>
                        <input
                            type="text"
                            placeholder="Ticket code"
                            prop:value=code_input
                            on:input=move |ev| code_input.set(event_target_value(&ev))
                        />
                        <button type="submit" disabled=move || busy.get()>
                            "Call"
                        </button>
                    </form>
                </div>
            </Suspense>

            {move || board.loading().then(|| view! { <p>"Loading..."</p> })}

            <section>
                <h2>"Active"</h2>
                <ul class="ticket-grid">
                    {move || {
                        board
                            .with_data(|b| b.active.clone())
                            .into_iter()
                            .map(|t| {
                                let code = t.code_or_id();
                                let (c1, c2, c3) = (code.clone(), code.clone(), code);
                                view! {
                                    <li>
                                        <QueueCard ticket=t />
                                        <div class="actions">
                                            <button
                                                disabled=move || busy.get()
                                                on:click=move |_| ticket_click(c1.clone(), TicketAction::InProcess, "In process")
                                            >
                                                "In-Process"
                                            </button>
                                            <button
                                                disabled=move || busy.get()
                                                on:click=move |_| ticket_click(c2.clone(), TicketAction::Done, "Done")
                                            >
                                                "Done"
                                            </button>
                                            <button
                                                disabled=move || busy.get()
                                                on:click=move |_| ticket_click(c3.clone(), TicketAction::Skip, "Skipped")
                                            >
                                                "Skip"
                                            </button>
                                        </div>
                                    </li>
                                }
                            })
                            .collect_view()
                    }}
                </ul>
            </section>

            <section>
                <h2>"Next"</h2>
                <ul class="ticket-grid small">
                    {move || {
                        board
                            .with_data(|b| b.next.clone())
                            .into_iter()
                            .map(|t| {
                                let code = t.code_or_id();
                                view! {
                                    <li>
                                        <span class="code">{t.label()}</span>
                                        <button
                                            disabled=move || busy.get()
                                            on:click=move |_| ticket_click(code.clone(), TicketAction::Call, "Called")
                                        >
                                            "Call"
                                        </button>
                                    </li>
                                }
                            })
                            .collect_view()
                    }}
                </ul>
            </section>

            <section>
                <h2>"Skipped"</h2>
                <ul class="ticket-grid small">
                    {move || {
                        board
                            .with_data(|b| b.skip_grid.clone())
                            .into_iter()
                            .map(|t| {
                                let (recall_id, done_id) = (t.id.clone(), t.id.clone());
                                view! {
                                    <li>
                                        <span class="code">{t.label()}</span>
                                        <button
                                            disabled=move || busy.get()
                                            on:click=move |_| command_click(recall_id.clone(), TicketCommand::Recall, "Recalled")
                                        >
                                            "Recall"
                                        </button>
                                        <button
                                            disabled=move || busy.get()
                                            on:click=move |_| command_click(done_id.clone(), TicketCommand::Done, "Done")
                                        >
                                            "Done"
                                        </button>
                                    </li>
                                }
                            })
                            .collect_view()
                    }}
                </ul>
            </section>

            <section class="totals">
                <h2>"Totals"</h2>
                <ul>
                    {move || {
                        board
                            .with_data(|b| b.totals.clone())
                            .into_iter()
                            .map(|(status, n)| {
                                view! {
                                    <li>
                                        <StatusBadge status=Some(TicketStatus::from(status)) />
                                        " "
                                        {n}
                                    </li>
                                }
                            })
                            .collect_view()
                    }}
                </ul>
            </section>
        </div>
    }
}

#[component]
fn Tv() -> impl IntoView {
    let event_id = StoredValue::new(use_event_id());
    let board = use_board(event_id.get_value(), TV_POLL);
    let settings = Resource::new(|| (), move |_| get_settings(event_id.get_value()));

    view! {
        <div class="page tv">
            <header class="tv-head">
                <h1>"Now serving"</h1>
                <span class="count">{move || format!("Waiting: {}", board.with_data(|b| b.next_count))}</span>
                {move || board.error().map(|e| view! { <span class="stale" title=e>"Reconnecting..."</span> })}
            </header>

            {move || board.loading().then(|| view! { <p class="loading">"Loading..."</p> })}

            <section class="tv-active">
                {move || {
                    board
                        .with_data(|b| b.active.clone())
                        .into_iter()
                        .map(|t| view! { <QueueCard ticket=t big=true /> })
                        .collect_view()
                }}
            </section>

            {move || view! { <NextTicker tickets=board.with_data(|b| b.next.clone()) /> }}

            <div class="tv-lower">
                <section class="tv-queue">
                    <h2>"Queue"</h2>
                    {move || {
                        board
                            .with_data(|b| b.queue_rows(6))
                            .into_iter()
                            .map(|row| {
                                view! {
                                    <div class="queue-row">
                                        {row
                                            .iter()
                                            .map(|t| view! { <span class="chip">{t.label()}</span> })
                                            .collect_view()}
                                    </div>
                                }
                            })
                            .collect_view()
                    }}
                </section>
                <section class="tv-skipped">
                    <h2>"Missed your call?"</h2>
                    <div class="queue-row">
                        {move || {
                            board
                                .with_data(|b| b.skip_grid.clone())
                                .iter()
                                .map(|t| view! { <span class="chip muted">{t.label()}</span> })
                                .collect_view()
                        }}
                    </div>
                </section>
                <Suspense>
                    {move || {
                        settings
                            .with(|res| match res {
                                Some(Ok(s)) => {
                                    view! { <QrBlock url=s.register_url.clone() caption="Scan to register" /> }
                                        .into_any()
                                }
                                _ => view! {}.into_any(),
                            })
                    }}
                </Suspense>
            </div>

            <details class="tv-board">
                <summary>"Board"</summary>
                {move || view! { <BoardView board=board.data() /> }}
            </details>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_event() {
        assert_eq!(with_event("/tv", None), "/tv");
        assert_eq!(with_event("/tv", Some("ana-jkt")), "/tv?event=ana-jkt");
        assert_eq!(
            with_event("/register", Some("ana jkt&day=2")),
            "/register?event=ana%20jkt%26day%3D2"
        );
    }

    #[test]
    fn test_default_page_size() {
        assert_eq!(DEFAULT_PAGE_SIZE, 10);
        assert!(PAGE_SIZES.contains(&DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn test_outcome_text() {
        let ticket = |code: &str| Ticket {
            id: code.to_lowercase(),
            code: Some(code.to_string()),
            ..Ticket::default()
        };
        let outcome = ActionOutcome {
            message: Some("ignored".to_string()),
            tickets: vec![ticket("AH001"), ticket("AH002")],
        };
        assert_eq!(outcome_text("Called", &outcome), "Called: AH001, AH002");

        let outcome = ActionOutcome {
            message: Some("Nothing queued".to_string()),
            tickets: Vec::new(),
        };
        assert_eq!(outcome_text("Called", &outcome), "Called. Nothing queued");
        assert_eq!(outcome_text("Promoted", &ActionOutcome::default()), "Promoted");
    }
}
