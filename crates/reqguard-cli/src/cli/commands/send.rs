//! `reqguard send <path>` – one request through the dispatcher.

use anyhow::{bail, Context, Result};
use reqguard_core::config::ReqguardConfig;
use reqguard_core::{CurlTransport, Method, Request, Response};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SendArgs {
    pub path: String,
    pub method: Method,
    pub policy: Option<String>,
    pub timeout_ms: Option<u64>,
    pub data: Option<String>,
    pub headers: Vec<String>,
}

/// Build the request described by the command-line arguments.
pub(crate) fn build_request(args: &SendArgs) -> Result<Request> {
    let mut req = Request::new(args.method, args.path.clone());
    for h in &args.headers {
        let Some((name, value)) = h.split_once(':') else {
            bail!("header {:?} is not in \"Name: value\" form", h);
        };
        req = req.header(name.trim(), value.trim());
    }
    if let Some(data) = &args.data {
        req = req.body(data.as_bytes());
    }
    if let Some(ms) = args.timeout_ms {
        req = req.timeout(Duration::from_millis(ms));
    }
    Ok(req)
}

fn print_response(resp: &Response) {
    println!("HTTP {}", resp.status);
    let body = resp.text();
    if !body.is_empty() {
        println!("{}", body);
    }
}

pub async fn run_send(cfg: &ReqguardConfig, args: SendArgs) -> Result<()> {
    let dispatcher = cfg.dispatcher(CurlTransport::new())?;
    let policy = match &args.policy {
        Some(name) => cfg.registry()?.require(name)?,
        None => dispatcher.policy().clone(),
    };
    let request = build_request(&args)?;

    // Ctrl-C cancels the request, including a pending backoff wait.
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    tracing::info!(
        "send {} via {} (policy {})",
        request.operation(),
        dispatcher.base_url(),
        policy.name()
    );
    let result = dispatcher.send_with(request, &policy, &cancel).await;
    watcher.abort();

    match result {
        Ok(resp) => {
            print_response(&resp);
            Ok(())
        }
        Err(err) => {
            if let Some(resp) = err.response() {
                print_response(resp);
            }
            let class = err.class;
            Err(err).with_context(|| format!("request failed ({})", class))
        }
    }
}
