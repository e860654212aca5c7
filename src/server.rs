//! Listener, accept loop and startup banner.

use std::convert::Infallible;
use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionLimiter, ConnectionTracker};
use crate::{args::Args, config, env_vars};
use relaygate_core::{ConfigProvider, Gateway, PeerAddr, identity};

/// How long open connections get to finish after shutdown is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// How long background writes get once connections are closed.
pub const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves `gateway` on `listener` until `shutdown` resolves.
///
/// Once `shutdown` fires, the listener stops accepting, open connections are
/// asked to finish their current exchange, and pending background writes are
/// given [`TASK_DRAIN_TIMEOUT`] to complete.
pub async fn serve<C, F>(
    listener: TcpListener,
    gateway: Arc<Gateway<C>>,
    shutdown: F,
) -> std::io::Result<()>
where
    C: ConfigProvider + 'static,
    F: Future<Output = ()>,
{
    let limiter = ConnectionLimiter::new(gateway.config().max_connections());
    let tracker = ConnectionTracker::new();
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::pin!(shutdown);

    loop {
        let (stream, addr) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(error = %err, "Failed to accept connection");
                    continue;
                }
            },
        };

        let admission = limiter.try_admit();
        if !admission.is_admitted() {
            warn!(
                peer = %addr,
                max = limiter.max_connections(),
                "Connection limit reached, dropping connection"
            );
            continue;
        }

        debug!(peer = %addr, "New connection");

        let guard = tracker.track();
        let gateway = gateway.clone();
        let mut stop_rx = stop_rx.clone();

        tokio::spawn(async move {
            let _admission = admission;
            let _guard = guard;
            let peer = PeerAddr(addr.ip());

            let service = service_fn(move |mut req: Request<Incoming>| {
                let gateway = gateway.clone();
                async move {
                    req.extensions_mut().insert(peer);
                    Ok::<_, Infallible>(gateway.handle(req).await)
                }
            });

            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => res,
                _ = stop_rx.changed() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };

            if let Err(err) = result {
                debug!(peer = %addr, error = %err, "Connection error");
            }
        });
    }

    info!(active = tracker.count(), "Shutting down, waiting for open connections");
    drop(listener);
    let _ = stop_tx.send(true);

    if !tracker.wait_for_shutdown(SHUTDOWN_GRACE).await {
        warn!(active = tracker.count(), "Grace period elapsed with connections still open");
    }
    if !gateway.tasks().drain(TASK_DRAIN_TIMEOUT).await {
        warn!(
            pending = gateway.tasks().in_flight(),
            "Background writes still pending at exit"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

/// Print startup banner with configuration
pub fn print_startup_info(args: &Args) {
    if args.quiet {
        println!(
            "🚀 RelayGate v{} starting on {}",
            env!("CARGO_PKG_VERSION"),
            args.listen_addr()
        );
        return;
    }

    println!("🛡️  {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("   {}", env!("CARGO_PKG_DESCRIPTION"));
    println!();
    println!("📡 Network Configuration:");
    println!("   Listen:         {}", args.listen_addr());
    let max_connections = config::get_max_connections();
    if max_connections == 0 {
        println!("   Connections:    unlimited");
    } else {
        println!("   Connections:    {max_connections} max");
    }
    println!();

    println!("⚡ Rate Limiting:");
    for (label, tier) in [
        ("Burst", config::get_burst_limit_config()),
        ("Per client", config::get_client_limit_config()),
        ("Global", config::get_global_limit_config()),
    ] {
        println!(
            "   {:<15} {} per {} seconds",
            format!("{label}:"),
            tier.max_requests,
            tier.window_duration.as_secs()
        );
    }

    let proxy_config = config::get_proxy_config();
    println!("🔧 Proxy Configuration:");
    println!("   Timeout:        {} seconds", proxy_config.timeout.as_secs());
    println!("   Max Body Size:  {} MB", proxy_config.max_body_size_mb());
    println!("   Redirects:      {}", proxy_config.max_redirects);
    let cache = config::get_cache_config();
    if cache.is_enabled() {
        println!(
            "   Cache:          {} entries, {} seconds",
            cache.max_entries,
            cache.ttl.as_secs()
        );
    } else {
        println!("   Cache:          disabled");
    }

    print_security_config();

    if args.verbose {
        print_env_config();
    }

    println!();
    println!("🚀 Server starting...");
}

/// Print security configuration summary
fn print_security_config() {
    let credentials = config::get_credential_config();

    println!("🔒 Security Configuration:");
    println!(
        "   Credentials:    {} mode, {} secret(s)",
        credentials.mode.label(),
        credentials.secrets.len()
    );
    if credentials.secrets.is_empty() {
        println!("   ⚠️  No secrets configured: every request will be rejected");
    }

    match config::get_allowed_proxy_ips() {
        Some(ips) if identity::trusts_any_peer(ips) => println!(
            "   Identity:       {} trusted from any peer",
            config::get_trusted_ip_header()
        ),
        Some(ips) => println!("   Identity:       Strict (trusted proxies: {})", ips.len()),
        None => println!("   Identity:       Peer address ({} ignored)", config::get_trusted_ip_header()),
    }

    if let Some(allowlist) = config::get_allowlist_config() {
        println!("   Allow-list:     {}", allowlist.hostname);
    }

    let reputation = config::get_reputation_config();
    println!(
        "   Reputation:     challenge above {}, block above {}",
        reputation.challenge_threshold(),
        reputation.block_threshold
    );

    let patterns = config::get_blocked_patterns();
    let agents = config::get_blocked_user_agents();
    if !patterns.is_empty() || !agents.is_empty() {
        println!(
            "   Extra rules:    {} pattern(s), {} user agent(s)",
            patterns.len(),
            agents.len()
        );
    }

    if config::get_diagnostics_enabled() {
        println!("   Diagnostics:    enabled");
    }
}

/// Print environment variable configuration status (used in verbose mode)
fn print_env_config() {
    println!();
    println!("🔧 Environment Variables:");

    for &var_name in env_vars::all_env_vars() {
        let display_value = match env::var(var_name) {
            Ok(_) if env_vars::is_sensitive(var_name) => "[CONFIGURED]".to_string(),
            Ok(value) => value,
            Err(_) => "[NOT SET]".to_string(),
        };
        println!("   {var_name:<33} = {display_value}");
    }
}
