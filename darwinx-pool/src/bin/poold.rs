//! Pool daemon: loads configuration, wires the template manager, job
//! builder, ledger, and Stratum listener, and runs until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bitcoin::Network;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use darwinx_pool::address::payout_script_pubkey;
use darwinx_pool::api::server::{SharedState, serve as serve_api};
use darwinx_pool::config::Config;
use darwinx_pool::job::{ActiveJobs, JobBuilder};
use darwinx_pool::ledger::Ledger;
use darwinx_pool::rpc::{RpcAuth, RpcClient};
use darwinx_pool::scorer::{Scorer, ScorerConfig};
use darwinx_pool::server::{run_scorer_fill_loop, run_stratum_listener, run_template_refresh_loop};
use darwinx_pool::stratum::PoolContext;
use darwinx_pool::submitter::Submitter;
use darwinx_pool::template::TemplateManager;
use darwinx_pool::tracing::prelude::*;
use darwinx_pool::vardiff::VarDiffConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    darwinx_pool::tracing::init_journald_or_stdout();

    // Fatal at startup per §7 `BadAddress` if the payout address doesn't
    // parse as a witness v0 address on mainnet.
    let payout_script = payout_script_pubkey(&config.payout.payout_address, Network::Bitcoin)
        .context("invalid payout address")?;

    let auth = match (&config.rpc.rpc_cookie_path, &config.rpc.rpc_user, &config.rpc.rpc_pass) {
        (Some(path), _, _) => RpcAuth::CookieFile(path.clone()),
        (None, Some(user), Some(pass)) => RpcAuth::UserPass { user: user.clone(), pass: pass.clone() },
        _ => anyhow::bail!("rpc config must set either rpc_cookie_path or rpc_user/rpc_pass"),
    };

    let rpc_url = match &config.rpc.rpc_wallet {
        Some(wallet) => format!("http://{}:{}/wallet/{wallet}", config.rpc.rpc_host, config.rpc.rpc_port),
        None => format!("http://{}:{}", config.rpc.rpc_host, config.rpc.rpc_port),
    };
    let rpc = Arc::new(RpcClient::new(rpc_url, auth));

    let template_manager = Arc::new(TemplateManager::new(
        (*rpc).clone(),
        Duration::from_secs(config.template.gbt_interval_seconds),
    ));

    let ledger = Arc::new(Ledger::open(&config.ledger.database_path).await.context("opening ledger")?);
    let submitter = Arc::new(Submitter::new(rpc.clone(), ledger.clone()));
    let (template_notify, _) = tokio::sync::watch::channel(0u64);

    let ctx = Arc::new(PoolContext {
        active_jobs: Arc::new(ActiveJobs::new(config.template.active_jobs_capacity)),
        job_builder: Arc::new(JobBuilder::new()),
        template_manager: template_manager.clone(),
        ledger: ledger.clone(),
        submitter,
        scorer: config.scorer.enabled.then(|| {
            Arc::new(Scorer::new(ScorerConfig {
                pool_size: config.scorer.pool_size,
                weight_hash: config.scorer.weight_hash,
                weight_entropy: config.scorer.weight_entropy,
                ntime_drift_seconds: config.scorer.ntime_drift_seconds,
            }))
        }),
        payout_script: Arc::new(payout_script),
        extranonce1_size: config.network.extranonce1_size,
        extranonce2_size: config.network.extranonce2_size,
        vardiff_config: VarDiffConfig {
            diff_min: config.difficulty.diff_min,
            diff_max: config.difficulty.diff_max,
            initial_difficulty: config.difficulty.initial_difficulty,
            target_shares_per_min: config.difficulty.vardiff_target_shares_per_min,
            adjust_every_seconds: config.difficulty.adjust_every_seconds,
            adjust_ratio: config.difficulty.adjust_ratio,
            max_shares_per_sec: config.difficulty.max_shares_per_sec,
        },
        max_ntime_drift_secs: config.template.ntime_drift_seconds,
        template_notify,
    });

    let shutdown = CancellationToken::new();
    let tasks = TaskTracker::new();

    let stratum_addr = format!("{}:{}", config.network.stratum_host, config.network.stratum_port);
    {
        let ctx = ctx.clone();
        let tasks_inner = tasks.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            if let Err(err) = run_stratum_listener(&stratum_addr, ctx, tasks_inner, shutdown).await {
                error!(error = %err, "stratum listener exited");
            }
        });
    }

    {
        let ctx = ctx.clone();
        let interval = Duration::from_secs(config.template.gbt_interval_seconds);
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            run_template_refresh_loop(ctx, interval, shutdown).await;
        });
    }

    if config.scorer.enabled {
        let ctx = ctx.clone();
        let interval = Duration::from_secs(config.scorer.fill_interval_seconds);
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            run_scorer_fill_loop(ctx, interval, shutdown).await;
        });
    }

    {
        let state = SharedState { ledger: ledger.clone(), scorer: ctx.scorer.clone() };
        let listen = config.api.listen.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            if let Err(err) = serve_api(&listen, state, shutdown).await {
                error!(error = %err, "stats API exited");
            }
        });
    }

    tasks.close();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = terminate_signal() => {
            info!("received SIGTERM, shutting down");
        }
    }

    shutdown.cancel();
    tasks.wait().await;

    Ok(())
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    term.recv().await;
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
