use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mail_relay::auth::token_manager::TokenManager;
use mail_relay::chat::telegram::TelegramClient;
use mail_relay::config::load_config;
use mail_relay::daemon::error_log::ErrorLog;
use mail_relay::daemon::notifier::Notifier;
use mail_relay::daemon::{Daemon, DaemonConfig, install_stop_handler};
use mail_relay::mail::gmail::GmailClient;

#[derive(Parser)]
#[command(name = "mail_relay")]
#[command(about = "Relay unread Gmail messages with a given subject to Telegram", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/mail_relay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll forever: scan, relay, mark read, sleep
    Run {
        /// Seconds to sleep between cycles (overrides relay.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run a single cycle and exit
    Once,

    /// Run the browser consent flow and store a fresh token
    Login,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {e:#}"))?;
    let token_mgr = TokenManager::from_config(&cfg)?;

    let connect = || -> Result<GmailClient> {
        let cred = token_mgr.obtain_credential()?;
        Ok(GmailClient::new(cred.access_token))
    };

    let chat = TelegramClient::new(&cfg.telegram.token, cfg.telegram.chat_id.clone());
    let notifier = Notifier::with_limit(&chat, cfg.relay.max_message_chars);
    let mut daemon_cfg = DaemonConfig::from(&cfg);

    match cli.cmd {
        Command::Login => {
            let cred = token_mgr.reauthorize()?;
            println!(
                "Saved credential to {} (refresh token: {})",
                cfg.gmail.token_file.display(),
                if cred.can_refresh() { "yes" } else { "no" }
            );
            Ok(())
        }

        Command::Once => {
            let mut daemon = Daemon::new(
                daemon_cfg,
                |after| cfg.search_query(after),
                notifier,
                ErrorLog::new(&cfg.relay.error_log),
            );
            let report = daemon.run_cycle(connect);
            if report.aborted || report.failed > 0 {
                bail!(
                    "cycle incomplete ({} failed, aborted: {}); see {}",
                    report.failed,
                    report.aborted,
                    cfg.relay.error_log.display()
                );
            }
            println!("{} found, {} relayed", report.found, report.relayed);
            Ok(())
        }

        Command::Run { interval } => {
            if let Some(secs) = interval {
                if secs == 0 {
                    bail!("--interval must be at least 1 second");
                }
                daemon_cfg.interval_secs = secs;
            }
            let running = install_stop_handler()?;
            let mut daemon = Daemon::new(
                daemon_cfg,
                |after| cfg.search_query(after),
                notifier,
                ErrorLog::new(&cfg.relay.error_log),
            );
            daemon.run(connect, &running)
        }
    }
}
