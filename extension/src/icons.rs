// Lucide icon components for Dioxus
// SVG paths inlined; every icon shares the same 24x24 stroke frame

use dioxus::prelude::*;

#[component]
fn Frame(class: Option<String>, children: Element) -> Element {
    rsx! {
        svg {
            class: "{class.unwrap_or_default()}",
            xmlns: "http://www.w3.org/2000/svg",
            width: "24",
            height: "24",
            view_box: "0 0 24 24",
            fill: "none",
            stroke: "currentColor",
            stroke_width: "2",
            stroke_linecap: "round",
            stroke_linejoin: "round",
            {children}
        }
    }
}

#[component]
pub fn Wallet(class: Option<String>) -> Element {
    rsx! {
        Frame { class,
            path { d: "M19 7V4a1 1 0 0 0-1-1H5a2 2 0 0 0 0 4h15a1 1 0 0 1 1 1v4h-3a2 2 0 0 0 0 4h3a1 1 0 0 0 1-1v-2a1 1 0 0 0-1-1" }
            path { d: "M3 5v14a2 2 0 0 0 2 2h15a1 1 0 0 0 1-1v-4" }
        }
    }
}

#[component]
pub fn CreditCard(class: Option<String>) -> Element {
    rsx! {
        Frame { class,
            rect { width: "20", height: "14", x: "2", y: "5", rx: "2" }
            line { x1: "2", x2: "22", y1: "10", y2: "10" }
        }
    }
}

#[component]
pub fn RefreshCw(class: Option<String>) -> Element {
    rsx! {
        Frame { class,
            path { d: "M3 12a9 9 0 0 1 9-9 9.75 9.75 0 0 1 6.74 2.74L21 8" }
            path { d: "M21 3v5h-5" }
            path { d: "M21 12a9 9 0 0 1-9 9 9.75 9.75 0 0 1-6.74-2.74L3 16" }
            path { d: "M8 16H3v5" }
        }
    }
}

#[component]
pub fn CheckCircle(class: Option<String>) -> Element {
    rsx! {
        Frame { class,
            circle { cx: "12", cy: "12", r: "10" }
            path { d: "m9 12 2 2 4-4" }
        }
    }
}

#[component]
pub fn AlertCircle(class: Option<String>) -> Element {
    rsx! {
        Frame { class,
            circle { cx: "12", cy: "12", r: "10" }
            line { x1: "12", x2: "12", y1: "8", y2: "12" }
            line { x1: "12", x2: "12.01", y1: "16", y2: "16" }
        }
    }
}

#[component]
pub fn ExternalLink(class: Option<String>) -> Element {
    rsx! {
        Frame { class,
            path { d: "M15 3h6v6" }
            path { d: "M10 14 21 3" }
            path { d: "M18 13v6a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2V8a2 2 0 0 1 2-2h6" }
        }
    }
}

#[component]
pub fn Trash(class: Option<String>) -> Element {
    rsx! {
        Frame { class,
            path { d: "M3 6h18" }
            path { d: "M19 6v14c0 1-1 2-2 2H7c-1 0-2-1-2-2V6" }
            path { d: "M8 6V4c0-1 1-2 2-2h4c1 0 2 1 2 2v2" }
        }
    }
}

#[component]
pub fn X(class: Option<String>) -> Element {
    rsx! {
        Frame { class,
            path { d: "M18 6 6 18" }
            path { d: "m6 6 12 12" }
        }
    }
}
