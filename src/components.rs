use gloo_timers::future::TimeoutFuture;
use leptos::prelude::*;
use leptos::task::spawn_local;
use qrcode::render::svg;
use qrcode::QrCode;

use crate::model::{compact_code, Board, Ticket, TicketStatus};

const TOAST_MS: u32 = 2500;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub kind: ToastKind,
    pub message: String,
}

/// Page-wide notification stack. Provided once by `App`; every page pushes into it.
#[derive(Copy, Clone)]
pub struct Toasts {
    items: RwSignal<Vec<Toast>>,
    next_id: StoredValue<u64>,
}

impl Toasts {
    pub fn push(&self, kind: ToastKind, message: impl Into<String>) {
        let id = self.next_id.get_value();
        self.next_id.set_value(id + 1);
        self.items.update(|items| {
            items.push(Toast {
                id,
                kind,
                message: message.into(),
            })
        });

        let toasts = *self;
        spawn_local(async move {
            TimeoutFuture::new(TOAST_MS).await;
            toasts.dismiss(id);
        });
    }

    pub fn dismiss(&self, id: u64) {
        let _ = self.items.try_update(|items| items.retain(|t| t.id != id));
    }
}

pub fn provide_toasts() -> Toasts {
    let toasts = Toasts {
        items: RwSignal::new(Vec::new()),
        next_id: StoredValue::new(0),
    };
    provide_context(toasts);
    toasts
}

pub fn use_toasts() -> Toasts {
    expect_context()
}

#[component]
pub fn ToastStack() -> impl IntoView {
    let toasts = use_toasts();

    view! {
        <div class="toast-stack">
            {move || {
                toasts
                    .items
                    .get()
                    .into_iter()
                    .map(|toast| {
                        let class = match toast.kind {
                            ToastKind::Info => "toast toast-info",
                            ToastKind::Success => "toast toast-success",
                            ToastKind::Error => "toast toast-error",
                        };
                        let id = toast.id;
                        view! {
                            <div class=class>
                                <p>{toast.message}</p>
                                <button
                                    class="toast-close"
                                    aria-label="Close"
                                    on:click=move |_| toasts.dismiss(id)
                                >
                                    "✕"
                                </button>
                            </div>
                        }
                    })
                    .collect_view()
            }}
        </div>
    }
}

fn status_class(status: &TicketStatus) -> &'static str {
    match status {
        TicketStatus::Pending => "badge badge-pending",
        TicketStatus::Queued => "badge badge-queued",
        TicketStatus::Active => "badge badge-active",
        TicketStatus::Called => "badge badge-called",
        TicketStatus::InProcess => "badge badge-in-process",
        TicketStatus::Done => "badge badge-done",
        TicketStatus::Deferred => "badge badge-deferred",
        TicketStatus::Skipped => "badge badge-skipped",
        TicketStatus::NoShow => "badge badge-no-show",
        TicketStatus::Cancelled => "badge badge-cancelled",
        TicketStatus::Other(_) => "badge",
    }
}

#[component]
pub fn StatusBadge(status: Option<TicketStatus>) -> impl IntoView {
    let status = status.unwrap_or(TicketStatus::Pending);
    view! { <span class=status_class(&status)>{status.label()}</span> }
}

#[component]
pub fn QueueCard(ticket: Ticket, #[prop(optional)] big: bool) -> impl IntoView {
    let class = if big { "queue-card big" } else { "queue-card" };
    let code = compact_code(&ticket.label());
    // The holder's name is only shown under a real code, otherwise it is already the label.
    let holder = ticket
        .code
        .as_ref()
        .filter(|c| !c.is_empty())
        .and(ticket.name.clone())
        .filter(|n| !n.is_empty());

    view! {
        <div class=class>
            <div class="queue-card-head">
                <div class="code">{code}</div>
                <StatusBadge status=ticket.status />
            </div>
            {holder.map(|name| view! { <div class="holder">{name}</div> })}
        </div>
    }
}

/// Horizontally scrolling strip of upcoming codes. The list is rendered twice so the CSS
/// animation can loop without a gap.
#[component]
pub fn NextTicker(tickets: Vec<Ticket>) -> impl IntoView {
    let seconds = (tickets.len() as u64 * 3).max(15);
    let style = format!("animation-duration: {seconds}s;");
    let chip = |t: &Ticket| view! { <span class="chip">{compact_code(&t.label())}</span> };

    view! {
        <div class="ticker">
            <div class="ticker-track" style=style>
                {tickets.iter().map(chip).collect_view()}
                {tickets.iter().map(chip).collect_view()}
            </div>
        </div>
    }
}

#[component]
pub fn BoardView(board: Board) -> impl IntoView {
    view! {
        <div class="board-view">
            <section>
                <h3>"Active"</h3>
                <ul class="ticket-grid">
                    {board
                        .active
                        .into_iter()
                        .map(|t| {
                            view! {
                                <li>
                                    <QueueCard ticket=t />
                                </li>
                            }
                        })
                        .collect_view()}
                </ul>
            </section>
            <section>
                <h3>"Next"</h3>
                <ul class="ticket-grid small">
                    {board
                        .next
                        .iter()
                        .map(|t| view! { <li class="code">{t.label()}</li> })
                        .collect_view()}
                </ul>
            </section>
        </div>
    }
}

/// Renders `data` as an SVG QR code, or None when it doesn't fit in one.
pub fn qr_svg(data: &str) -> Option<String> {
    let code = QrCode::new(data.as_bytes()).ok()?;
    Some(
        code.render::<svg::Color>()
            .min_dimensions(180, 180)
            .dark_color(svg::Color("#7a0f2b"))
            .light_color(svg::Color("#ffffff"))
            .build(),
    )
}

#[component]
pub fn QrBlock(url: String, caption: &'static str) -> impl IntoView {
    match qr_svg(&url) {
        Some(svg) => view! {
            <figure class="qr">
                <div inner_html=svg />
                <figcaption>{caption}</figcaption>
            </figure>
        }
        .into_any(),
        None => view! { <p class="qr">{url}</p> }.into_any(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_svg() {
        let svg = qr_svg("https://queue.example.com/register?event=seed-event").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#7a0f2b"));
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(&TicketStatus::InProcess), "badge badge-in-process");
        assert_eq!(status_class(&TicketStatus::Other("X".to_string())), "badge");
    }
}
