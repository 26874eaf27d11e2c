use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jib_gateway::state::AppState;
use jib_gateway::{build_router, ratelimit, secret};
use jib_gateway_core::config::{config_dir, RepoConfig};
use jib_gateway_core::validate::allowed_repo_roots;
use jib_gateway_core::{AuthMode, TrustedUsers};
use jib_gateway_github::TokenStore;
use jib_gateway_worktree::{WorktreeManager, active_docker_containers};

#[derive(Parser)]
#[command(name = "jib-gateway", about = "Policy-enforcing git/gh gateway for agent containers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway HTTP server
    Serve {
        /// Host to listen on (default: GATEWAY_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(long, default_value_t = 9847)]
        port: u16,
    },
    /// Manage container worktrees (driven by the host launcher)
    Worktree {
        #[command(subcommand)]
        action: WorktreeAction,
    },
}

#[derive(Subcommand)]
enum WorktreeAction {
    /// Create (or reuse) an isolated worktree for a container
    Create {
        /// Repository name under the repos root
        repo: String,
        /// Container identifier
        container_id: String,
        /// Branch or ref to base the worktree on
        #[arg(long, default_value = "HEAD")]
        base: String,
        /// Owner uid for the worktree
        #[arg(long, default_value_t = 1000)]
        uid: u32,
        /// Owner gid for the worktree
        #[arg(long, default_value_t = 1000)]
        gid: u32,
    },
    /// Remove a container's worktree
    Remove {
        repo: String,
        container_id: String,
        /// Remove even with uncommitted changes
        #[arg(long)]
        force: bool,
        /// Keep the container branch instead of deleting it
        #[arg(long)]
        keep_branch: bool,
    },
    /// List worktrees on disk
    List,
    /// Remove worktrees whose containers are no longer running
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    // Secrets and overrides may live in a .env during development.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { host, port } => serve(host, port).await,
        Commands::Worktree { action } => worktree(action).await,
    }
}

async fn serve(host: Option<String>, port: u16) -> anyhow::Result<()> {
    let secret = secret::load_or_generate(&config_dir().join("gateway-secret"))
        .context("failed to configure gateway secret")?;

    let repo_config = RepoConfig::load_default().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "no repository config; serving with bot-only defaults");
        RepoConfig::default()
    });

    let tokens = std::sync::Arc::new(TokenStore::new(TokenStore::default_token_file()));
    let state = AppState::new(
        secret,
        repo_config,
        tokens,
        TrustedUsers::from_env(),
        ratelimit::RateLimits::from_env(),
        allowed_repo_roots(),
    );

    match state
        .github
        .validate_incognito_config(state.repo_config.incognito_user().as_deref())
        .await
    {
        Ok(Some(user)) => tracing::info!(github_user = %user, "incognito mode configured"),
        Ok(None) => tracing::info!("no incognito user configured (incognito mode disabled)"),
        // Bot-mode requests still work; only incognito operation is off.
        Err(err) => tracing::warn!(error = %err, "incognito config validation failed"),
    }

    let manager = WorktreeManager::with_default_roots(state.repo_config.bot_username.clone());
    let active = active_docker_containers().await;
    let removed = manager.orphan_sweep(&active).await;
    if removed > 0 {
        tracing::info!(removed, "cleaned up orphaned worktrees");
    }

    let host = host
        .or_else(|| std::env::var("GATEWAY_HOST").ok())
        .unwrap_or_else(|| "0.0.0.0".to_owned());
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        github_token_valid = state.tokens.is_valid(AuthMode::Bot),
        auth_enabled = true,
        rate_limiting_enabled = true,
        "starting gateway sidecar"
    );

    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")
}

async fn worktree(action: WorktreeAction) -> anyhow::Result<()> {
    let repo_config = RepoConfig::load_default().unwrap_or_default();
    let manager = WorktreeManager::with_default_roots(repo_config.bot_username.clone());

    match action {
        WorktreeAction::Create {
            repo,
            container_id,
            base,
            uid,
            gid,
        } => {
            let info = manager.create(&repo, &container_id, &base, uid, gid).await?;
            println!(
                "{} -> {} (branch {})",
                info.container_id,
                info.worktree_path.display(),
                info.branch
            );
        }
        WorktreeAction::Remove {
            repo,
            container_id,
            force,
            keep_branch,
        } => {
            let result = manager
                .remove(&container_id, &repo, force, !keep_branch)
                .await?;
            if let Some(warning) = &result.warning {
                eprintln!("warning: {warning}");
            }
            if !result.success {
                anyhow::bail!("worktree not removed (use --force to override)");
            }
            println!("removed {container_id}/{repo}");
        }
        WorktreeAction::List => {
            for container in manager.list() {
                println!("{}", container.container_id);
                for repo in container.repos {
                    let branch = repo.branch.as_deref().unwrap_or("?");
                    println!("  {} [{branch}] {}", repo.name, repo.path.display());
                }
            }
        }
        WorktreeAction::Sweep => {
            let active = active_docker_containers().await;
            let removed = manager.orphan_sweep(&active).await;
            println!("removed {removed} orphaned worktree(s)");
        }
    }
    Ok(())
}
