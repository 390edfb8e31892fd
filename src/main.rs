// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passkey Wallet CLI.
//!
//! Passkeys are emulated by a software authenticator whose credentials live
//! in the data directory next to the credential bundle and session cookie.
//! Frame embedded keys live in their own subdirectory, which only the frame
//! launcher opens.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use zeroize::Zeroizing;

use passkey_wallet::api::SessionUser;
use passkey_wallet::config::{ClientConfig, FRAME_KEY_DIR};
use passkey_wallet::flows::{self, AuthOutcome};
use passkey_wallet::frame::{LocalFrameLauncher, RevealSink};
use passkey_wallet::logging::{self, LogFormat};
use passkey_wallet::poller::{watch_history, watch_wallet};
use passkey_wallet::storage::{FileStorage, LocalStorage};
use passkey_wallet::webauthn::SoftwareAuthenticator;
use passkey_wallet::ClientState;

#[derive(Parser)]
#[command(name = "passkey-wallet")]
#[command(author, version, about = "Passkey-authenticated custodial wallet client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a passkey, or sign up if the email is new
    Login {
        #[arg(value_name = "EMAIL")]
        email: String,
    },

    /// Log in with a credential bundle sent by email
    EmailAuth {
        #[arg(value_name = "EMAIL")]
        email: String,

        /// Bundle from the email (prompted for when omitted)
        #[arg(long)]
        bundle: Option<String>,
    },

    /// Replace a lost passkey
    Recover {
        #[arg(value_name = "EMAIL")]
        email: String,

        /// Name for the new passkey
        #[arg(long, value_name = "LABEL")]
        authenticator_name: String,

        /// Recovery bundle from the email (prompted for when omitted)
        #[arg(long)]
        bundle: Option<String>,
    },

    /// Show the current session
    Whoami,

    /// End the session and forget the stored bundle
    Logout,

    /// Show address and balance
    Wallet,

    /// Show transfers
    History,

    /// Send funds
    Send {
        /// Amount in ETH, e.g. 0.01
        #[arg(value_name = "AMOUNT")]
        amount: String,

        #[arg(value_name = "DESTINATION")]
        destination: String,
    },

    /// Ask the faucet for a drop
    Drop,

    /// Reveal the wallet mnemonic
    Export,

    /// Follow balance and history until interrupted
    Watch,
}

/// Prints exported secrets to the terminal and nowhere else.
struct TerminalReveal;

impl RevealSink for TerminalReveal {
    fn reveal(&self, secret: Zeroizing<String>) {
        let mut out = io::stdout().lock();
        // Nothing to recover from if the terminal is gone.
        let _ = writeln!(out, "\nWallet mnemonic (keep it secret):\n\n  {}\n", secret.as_str());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(LogFormat::from_env());
    let cli = Cli::parse();

    let config = ClientConfig::from_env()?;
    let storage: Arc<dyn LocalStorage> = Arc::new(
        FileStorage::open(&config.data_dir)
            .with_context(|| format!("opening data directory {}", config.data_dir.display()))?,
    );
    let authenticator = Arc::new(SoftwareAuthenticator::with_storage(
        format!("https://{}", config.rp_id),
        storage.clone(),
    ));
    let launcher = LocalFrameLauncher::with_reveal_sink(Arc::new(TerminalReveal))
        .with_key_dir(config.data_dir.join(FRAME_KEY_DIR))
        .context("opening frame key directory")?;
    let state = ClientState::new(config, storage.clone(), authenticator, Arc::new(launcher))?;

    if state.api().load_session(&*storage)? {
        info!("Restored session cookie");
    }

    let result = run(&state, cli.command).await;
    state.api().save_session(&*storage)?;
    result
}

async fn run(state: &ClientState, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email } => {
            match flows::register_or_authenticate(state, &email).await? {
                AuthOutcome::Authenticated {
                    sub_organization_id,
                    ..
                } => println!("Logged in. Sub-organization: {sub_organization_id}"),
                AuthOutcome::Registered { state } => println!(
                    "Signed up and logged in as {}",
                    state.email.as_deref().unwrap_or(&email)
                ),
            }
        }
        Commands::EmailAuth { email, bundle } => {
            let pending = flows::begin_email_auth(state, &email).await?;
            println!("A login bundle was sent to {email}.");
            let bundle = match bundle {
                Some(bundle) => bundle,
                None => prompt("Paste the bundle").await?,
            };
            let auth = pending.complete(state, &bundle).await?;
            println!(
                "Logged in. Sub-organization: {}",
                auth.sub_organization_id.as_deref().unwrap_or("unknown")
            );
        }
        Commands::Recover {
            email,
            authenticator_name,
            bundle,
        } => {
            // Reject a bad label before anything is emailed.
            passkey_wallet::validation::validate_authenticator_label(&authenticator_name)?;
            let recovery = flows::begin_recovery(state, &email).await?;
            println!("A recovery bundle was sent to {email}.");
            let bundle = match bundle {
                Some(bundle) => bundle,
                None => prompt("Paste the recovery bundle").await?,
            };
            let activity = recovery.recover(state, &bundle, &authenticator_name).await?;
            println!(
                "Passkey \"{authenticator_name}\" added (activity {}). Log in again with it.",
                activity.id
            );
        }
        Commands::Whoami => match state.api().whoami().await? {
            Some(user) => print_user(&user),
            None => println!("Not logged in"),
        },
        Commands::Logout => {
            let frame = state.auth_frame();
            flows::logout(state, Some(&frame)).await?;
            println!("Logged out");
        }
        Commands::Wallet => {
            let wallet = state.api().wallet().await?;
            println!("Address: {}", wallet.address);
            println!("Balance: {} ETH", wallet.balance);
            if let Some(drops) = wallet.drops_left {
                println!("Faucet drops left: {drops}");
            }
        }
        Commands::History => {
            let history = state.api().history().await?;
            if history.is_empty() {
                println!("No transfers yet");
            }
            for transfer in history {
                println!(
                    "#{} {:>8} {} ETH {} -> {} ({})",
                    transfer.block,
                    transfer.kind,
                    transfer.amount,
                    transfer.source,
                    transfer.destination,
                    transfer.hash
                );
            }
        }
        Commands::Send {
            amount,
            destination,
        } => {
            let hash = flows::send(state, &amount, &destination).await?;
            println!("Sent. Transaction hash: {}", hash.hash);
        }
        Commands::Drop => {
            let hash = flows::request_drop(state).await?;
            println!("Drop on its way. Transaction hash: {}", hash.hash);
        }
        Commands::Export => {
            let frame = state.export_frame();
            flows::export_wallet(state, &frame).await?;
            frame.clear();
        }
        Commands::Watch => watch(state).await?,
    }
    Ok(())
}

async fn watch(state: &ClientState) -> Result<()> {
    if !state.session.refresh().await.is_logged_in {
        bail!("not logged in");
    }

    let mut wallet = watch_wallet(state.api().clone());
    let mut history = watch_history(state.api().clone());

    loop {
        tokio::select! {
            Some(info) = wallet.next() => {
                println!("Balance: {} ETH ({})", info.balance, info.address);
            }
            Some(transfers) = history.next() => {
                println!("{} transfer(s)", transfers.len());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping pollers");
                break;
            }
        }
    }

    wallet.cancel();
    history.cancel();
    Ok(())
}

fn print_user(user: &SessionUser) {
    println!("Email: {}", user.email.as_deref().unwrap_or("unknown"));
    println!("User id: {}", user.id.as_deref().unwrap_or("unknown"));
    if let Some(sub_org) = &user.sub_organization_id {
        println!("Sub-organization: {sub_org}");
    }
}

async fn prompt(label: &str) -> Result<String> {
    let label = label.to_string();
    tokio::task::spawn_blocking(move || -> Result<String> {
        print!("{label}: ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let line = line.trim().to_string();
        if line.is_empty() {
            bail!("no input given");
        }
        Ok(line)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_send() {
        let cli = Cli::try_parse_from(["passkey-wallet", "send", "0.01", "0xdest"]).unwrap();
        match cli.command {
            Commands::Send {
                amount,
                destination,
            } => {
                assert_eq!(amount, "0.01");
                assert_eq!(destination, "0xdest");
            }
            _ => panic!("expected send"),
        }
    }
}
