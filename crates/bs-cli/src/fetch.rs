//! `fetch`: one real request through the engine

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use serde_json::Value;

use bs_core::{Bridge, BridgeState, Operation, PageContext, PageRequest, RequestBinding, Variant};

use crate::http::{HttpFactory, Transport};
use crate::store::load_store;

/// The CLI has no document to wait for. Idle requests are queued and
/// drained by the caller.
#[derive(Default)]
struct CliPage {
    idle_requested: bool,
}

impl PageContext for CliPage {
    fn document_ready(&self) -> bool {
        true
    }

    fn request_idle(&mut self) {
        self.idle_requested = true;
    }
}

pub struct FetchArgs<'a> {
    pub verb: &'a str,
    pub url: &'a str,
    pub body: Option<&'a str>,
    pub headers: &'a [String],
    pub include_headers: bool,
}

pub fn cmd_fetch(store: &Path, variant: Variant, args: &FetchArgs<'_>) -> Result<(), String> {
    let document = load_store(store)?;
    let transport = Rc::new(Transport::new()?);
    let mut bridge = Bridge::new(RequestBinding::new(HttpFactory::new(transport), variant));

    let mut page = CliPage::default();
    bridge.start(&document, &mut page);
    while std::mem::take(&mut page.idle_requested) {
        bridge.on_idle(&document, &mut page);
    }

    let request = bridge.binding().construct();
    let events = Rc::new(Cell::new(0u32));
    {
        let events = events.clone();
        request.set_on_ready_state_change(Some(Rc::new(move || events.set(events.get() + 1))));
    }

    request
        .call(Operation::Open, &[Value::from(args.verb), Value::from(args.url)])
        .map_err(|e| format!("open() failed: {}", e))?;
    for header in args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("Invalid header '{}': expected 'Name: value'", header))?;
        request
            .call(
                Operation::SetRequestHeader,
                &[Value::from(name.trim()), Value::from(value.trim())],
            )
            .map_err(|e| format!("setRequestHeader() failed: {}", e))?;
    }
    let send_args: Vec<Value> = args.body.map(Value::from).into_iter().collect();
    request
        .call(Operation::Send, &send_args)
        .map_err(|e| format!("send() failed: {}", e))?;

    print_outcome(&bridge, &request, events.get(), args)
}

fn print_outcome(
    bridge: &Bridge<HttpFactory>,
    request: &PageRequest<crate::http::HttpRequest>,
    events: u32,
    args: &FetchArgs<'_>,
) -> Result<(), String> {
    let binding = bridge.binding();
    let engine = match bridge.state() {
        BridgeState::Installed => format!(
            "installed ({}, {} rules)",
            binding.variant(),
            binding.matcher().map_or(0, |matcher| matcher.rules().len())
        ),
        BridgeState::Pending => "pending".to_string(),
        BridgeState::Disabled => "disabled".to_string(),
    };
    let substituted = match request {
        PageRequest::Intercepted(proxy) => proxy.is_substituted(),
        PageRequest::Native(_) => false,
    };

    println!(
        "{} {} -> {} {}",
        args.verb.to_ascii_uppercase(),
        args.url,
        request.status(),
        request.status_text()
    );
    println!("  Engine:      {}", engine);
    println!("  Substituted: {}", if substituted { "yes" } else { "no" });
    println!("  Final URL:   {}", request.response_url());
    println!("  Events:      {} readystatechange", events);

    if args.include_headers {
        if let Some(native) = binding.factory().last() {
            println!();
            for (name, value) in native.response_headers() {
                println!("{}: {}", name, value);
            }
        }
    }

    let body = request
        .response_text()
        .map_err(|e| format!("Failed to read response: {}", e))?;
    println!();
    println!("{}", body);
    Ok(())
}
