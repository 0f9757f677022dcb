//! Stratum TCP listener: accepts connections, runs each through
//! [`Session`], and keeps the shared template fresh in the background.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::job::JobBuilderParams;
use crate::stratum::PoolContext;
use crate::stratum::session::Session;
use crate::stratum::wire::parse_request;
use crate::tracing::prelude::*;

/// Accept loop for the Stratum listener. Runs until `shutdown` is cancelled.
pub async fn run_stratum_listener(
    bind_addr: &str,
    ctx: Arc<PoolContext>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "stratum listener bound");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("stratum listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                let ctx = ctx.clone();
                let child_shutdown = shutdown.clone();
                tasks.spawn(async move {
                    if let Err(err) = run_connection(socket, ctx, child_shutdown).await {
                        warn!(%peer, error = %err, "session ended with error");
                    }
                });
            }
        }
    }
}

async fn run_connection(
    socket: tokio::net::TcpStream,
    ctx: Arc<PoolContext>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut template_rx = ctx.template_notify.subscribe();
    let mut session = Session::new(ctx.clone());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            changed = template_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                if session.state() != crate::stratum::session::SessionState::Connected {
                    if let Some(job_line) = session.push_current_template_as_job(true) {
                        let mut bytes = serde_json::to_vec(&job_line)?;
                        bytes.push(b'\n');
                        write_half.write_all(&bytes).await?;
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let Some(request) = parse_request(&line) else {
                    continue;
                };
                for response in session.handle(&request).await {
                    let mut bytes = serde_json::to_vec(&response)?;
                    bytes.push(b'\n');
                    write_half.write_all(&bytes).await?;
                }
                if let Some(pending) = session.take_pending_block() {
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        let extranonce2 = match hex::decode(&pending.extranonce2_hex) {
                            Ok(bytes) => bytes,
                            Err(err) => {
                                error!(error = %err, "winning share had unparsable extranonce2");
                                return;
                            }
                        };
                        match ctx
                            .submitter
                            .submit(&pending.job, &pending.extranonce1, &extranonce2, &pending.header, pending.round_id)
                            .await
                        {
                            Ok(status) => info!(?status, "submitted candidate block"),
                            Err(err) => error!(error = %err, "failed to submit candidate block"),
                        }
                    });
                }
            }
        }
    }
}

/// Periodically refreshes the template, records round-boundary bookkeeping
/// on the ledger, and publishes on `PoolContext::template_notify` whenever
/// the fetched template is genuinely new (tracked by `job_seq`) so every
/// connected session pushes itself a fresh `clean=true` job (§4.3/§4.6).
pub async fn run_template_refresh_loop(
    ctx: Arc<PoolContext>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                match ctx.template_manager.refresh().await {
                    Ok((template, boundary)) => {
                        ctx.template_notify.send_if_modified(|seq| {
                            if *seq != template.job_seq {
                                *seq = template.job_seq;
                                true
                            } else {
                                false
                            }
                        });
                        if let Some(boundary) = boundary {
                            let prev_hash_hex = hex::encode(boundary.prev_hash_be);
                            if let Err(err) = ctx.ledger.on_new_template(&prev_hash_hex, boundary.network_difficulty).await {
                                warn!(error = %err, "failed to record round boundary");
                            }
                            debug!(height = boundary.height, "round boundary observed");
                        }
                    }
                    Err(err) => warn!(error = %err, "template refresh failed"),
                }
            }
        }
    }
}

/// Background pool filler for the (fully optional) DarwinX scorer (§4.5).
///
/// Builds candidate jobs off the current template and scores them with a
/// trial extranonce1/extranonce2 pair -- these trial bytes only feed the
/// ranking heuristic; the job itself carries no extranonce1 binding and is
/// handed out as-is to whichever session leases it next, same as a job
/// built directly by [`crate::stratum::session::Session::push_current_template_as_job`].
/// No-ops entirely if `ctx.scorer` is `None`.
pub async fn run_scorer_fill_loop(ctx: Arc<PoolContext>, interval: Duration, shutdown: CancellationToken) {
    let Some(scorer) = ctx.scorer.clone() else {
        return;
    };

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let Some(template) = ctx.template_manager.current() else {
                    continue;
                };
                while scorer.len() < scorer.capacity() {
                    let job = match ctx.job_builder.build(JobBuilderParams {
                        template: template.clone(),
                        payout_script: &ctx.payout_script,
                        extranonce1_size: ctx.extranonce1_size,
                        extranonce2_size: ctx.extranonce2_size,
                    }) {
                        Ok(job) => Arc::new(job),
                        Err(err) => {
                            warn!(error = %err, "scorer fill: failed to build candidate job");
                            break;
                        }
                    };
                    // `generate_extranonce1` just fills random bytes of a given
                    // size; reused here for the trial extranonce2 too, since
                    // the scorer's ranking score never touches the real
                    // submit-time validation path.
                    let trial_en1 = crate::job::generate_extranonce1(ctx.extranonce1_size);
                    let trial_en2 = crate::job::generate_extranonce1(ctx.extranonce2_size);
                    scorer.offer(job, &trial_en1, &trial_en2);
                }
            }
        }
    }
}
