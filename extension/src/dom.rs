//! Document access for the content script.

use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, MutationObserver, MutationObserverInit, MutationRecord};
use x402_pay_core::detection::{meta_name, meta_property, should_rescan, PageFields, FIELD_KEYS};
use x402_pay_core::relay::PageSource;

/// Reads `<meta name="x-402-*">` and `<meta property="x402:*">` tags.
/// The `name` form wins when both are present.
pub struct MetaReader {
    document: Document,
}

impl MetaReader {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn content_of(&self, attribute: &str, value: &str) -> Option<String> {
        let selector = format!("meta[{}=\"{}\"]", attribute, value);
        self.document
            .query_selector(&selector)
            .ok()
            .flatten()
            .and_then(|meta| meta.get_attribute("content"))
            .filter(|content| !content.trim().is_empty())
    }
}

impl PageSource for MetaReader {
    fn read_fields(&self) -> PageFields {
        let mut fields = PageFields::new();
        for key in FIELD_KEYS {
            let content = self
                .content_of("name", &meta_name(key))
                .or_else(|| self.content_of("property", &meta_property(key)));
            if let Some(content) = content {
                fields.insert(*key, content);
            }
        }
        fields
    }
}

fn inserted_nodes(record: &MutationRecord) -> Vec<(String, bool)> {
    let added = record.added_nodes();
    (0..added.length())
        .filter_map(|i| added.item(i))
        .map(|node| {
            let contains_meta = node
                .dyn_ref::<Element>()
                .and_then(|element| element.query_selector("meta").ok().flatten())
                .is_some();
            (node.node_name(), contains_meta)
        })
        .collect()
}

/// Call `on_change` whenever a meta tag is inserted under `<head>`
pub fn observe_head<F>(document: &Document, on_change: F) -> Result<MutationObserver, JsValue>
where
    F: Fn() + 'static,
{
    let callback = Closure::wrap(Box::new(move |records: js_sys::Array, _observer: MutationObserver| {
        let inserted: Vec<(String, bool)> = records
            .iter()
            .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
            .flat_map(|record| inserted_nodes(&record))
            .collect();
        if should_rescan(inserted.iter().map(|(name, meta)| (name.as_str(), *meta))) {
            on_change();
        }
    }) as Box<dyn FnMut(js_sys::Array, MutationObserver)>);

    let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
    callback.forget();

    let target = document
        .head()
        .map(Element::from)
        .or_else(|| document.document_element())
        .ok_or_else(|| JsValue::from_str("Document has no head"))?;
    let options = MutationObserverInit::new();
    options.set_child_list(true);
    options.set_subtree(true);
    observer.observe_with_options(&target, &options)?;
    Ok(observer)
}
