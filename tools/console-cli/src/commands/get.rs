//! Fetch a resource through the guarded client.

use std::time::Instant;

use anyhow::{Context as _, Result};
use chrono::Local;
use console_sdk::prelude::ApiRequest;
use futures::future::join_all;

use super::{parse_pairs, GetArgs};
use crate::context::Context;
use crate::output::format_millis;

/// Run the get command.
pub async fn run(args: GetArgs, ctx: &Context) -> Result<()> {
    let mut request = ApiRequest::get(args.path.clone());
    for (key, value) in parse_pairs(&args.query)? {
        request = request.query(key, value);
    }

    let client = ctx.client()?;
    let spinner = ctx.output.spinner(&format!("GET {}", args.path));
    let started = Instant::now();

    let calls = (0..args.repeat.max(1)).map(|_| {
        let request = request.clone();
        let client = client.clone();
        let cached = args.cached;
        async move {
            if cached {
                client.send_cached(request).await
            } else {
                client.send(request).await
            }
        }
    });
    let mut results = join_all(calls).await;
    spinner.finish_and_clear();

    let stats = client.cache_stats();
    let guardian = client.guardian().stats();
    ctx.output.debug(&format!(
        "{} call(s) in {} at {} (cache {} hit / {} miss, {} refresh cycle(s))",
        results.len(),
        format_millis(started.elapsed().as_millis() as u64),
        Local::now().format("%H:%M:%S"),
        stats.hits,
        stats.misses,
        guardian.refresh_cycles,
    ));

    let body = results
        .swap_remove(0)
        .with_context(|| format!("GET {} failed", args.path))?;
    ctx.output.json(&body);
    client.shutdown();
    Ok(())
}
