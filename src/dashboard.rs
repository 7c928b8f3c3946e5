use std::io::{IsTerminal, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::aave::AaveSource;
use crate::compound::CompoundSource;
use crate::contracts::{ContractCaller, Web3Caller};
use crate::filter::MatchMode;
use crate::merger::{TokenList, TokenResolver};
use crate::metadata::{HttpTokenMetadata, TokenMetadataProvider};
use crate::poller::Poller;
use crate::types::{Config, MarketSnapshot, Result};
use crate::view::{render, RateTable, ViewState};

pub const HELP: &str = "Commands: l | b (lending / borrowing), /<text> or search <text>, clear, prefix | contains, q";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show(RateTable),
    Search(String),
    ClearSearch,
    Mode(MatchMode),
    Help,
    Quit,
}

/// Parses one line of user input. Blank or unknown input yields `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if let Some(query) = line.strip_prefix('/') {
        return Some(Command::Search(query.trim().to_string()));
    }
    if let Some(query) = line.strip_prefix("search ") {
        return Some(Command::Search(query.trim().to_string()));
    }

    match line.to_ascii_lowercase().as_str() {
        "l" | "lending" => Some(Command::Show(RateTable::Lending)),
        "b" | "borrowing" => Some(Command::Show(RateTable::Borrowing)),
        "clear" => Some(Command::ClearSearch),
        "prefix" => Some(Command::Mode(MatchMode::Prefix)),
        "contains" => Some(Command::Mode(MatchMode::Contains)),
        "h" | "help" | "?" => Some(Command::Help),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// View state plus the latest published data of every source.
pub struct Dashboard {
    pub state: ViewState,
    aave: watch::Receiver<MarketSnapshot>,
    compound: watch::Receiver<MarketSnapshot>,
    tokens: watch::Receiver<TokenList>,
}

impl Dashboard {
    pub fn new(
        state: ViewState,
        aave: watch::Receiver<MarketSnapshot>,
        compound: watch::Receiver<MarketSnapshot>,
        tokens: watch::Receiver<TokenList>,
    ) -> Self {
        Self {
            state,
            aave,
            compound,
            tokens,
        }
    }

    /// Applies a command; returns whether the view changed.
    pub fn apply(&mut self, command: &Command) -> bool {
        let before = self.state.clone();
        match command {
            Command::Show(table) => self.state.table = *table,
            Command::Search(query) => self.state.search = query.clone(),
            Command::ClearSearch => self.state.search.clear(),
            Command::Mode(mode) => self.state.mode = *mode,
            Command::Help | Command::Quit => {}
        }
        self.state != before
    }

    pub fn render(&mut self, now: DateTime<Utc>) -> String {
        let aave = self.aave.borrow_and_update().clone();
        let compound = self.compound.borrow_and_update().clone();
        let tokens = self.tokens.borrow_and_update().clone();
        render(&self.state, &tokens, &aave, &compound, now)
    }
}

fn redraw(dashboard: &mut Dashboard) {
    let frame = dashboard.render(Utc::now());
    let mut stdout = std::io::stdout().lock();
    if stdout.is_terminal() {
        // Clear screen, cursor home.
        let _ = write!(stdout, "\x1B[2J\x1B[H");
    }
    let _ = write!(stdout, "{}", frame);
    let _ = writeln!(stdout, "{}", HELP);
    let _ = stdout.flush();
}

/// Starts both pollers and the token resolver, then redraws on every change until the user
/// quits or Ctrl-C arrives. All background tasks stop when this returns.
pub async fn run(config: Config) -> Result<()> {
    let caller: Arc<dyn ContractCaller> = Arc::new(Web3Caller::new(&config.rpc_endpoint)?);
    let aave = Poller::spawn(
        AaveSource::new(caller.clone(), config.aave_lending_pool)?,
        config.poll_interval,
    );
    let compound = Poller::spawn(
        CompoundSource::new(caller, config.compound_comptroller)?,
        config.poll_interval,
    );

    let provider: Arc<dyn TokenMetadataProvider> =
        Arc::new(HttpTokenMetadata::new(config.token_metadata_url.clone()));
    let resolver = TokenResolver::spawn(provider, aave.subscribe(), compound.subscribe());

    let state = ViewState {
        mode: config.search_mode,
        ..ViewState::default()
    };
    let mut aave_rx = aave.subscribe();
    let mut compound_rx = compound.subscribe();
    let mut tokens_rx = resolver.subscribe();
    let mut dashboard = Dashboard::new(state, aave.subscribe(), compound.subscribe(), resolver.subscribe());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    redraw(&mut dashboard);

    loop {
        tokio::select! {
            Ok(()) = aave_rx.changed() => {
                log::debug!("[Dashboard::run] {} snapshot updated", aave.name());
                redraw(&mut dashboard);
            }
            Ok(()) = compound_rx.changed() => {
                log::debug!("[Dashboard::run] {} snapshot updated", compound.name());
                redraw(&mut dashboard);
            }
            Ok(()) = tokens_rx.changed() => {
                redraw(&mut dashboard);
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Some(Command::Quit) => break,
                        Some(command) => {
                            if dashboard.apply(&command) || command == Command::Help {
                                redraw(&mut dashboard);
                            }
                        }
                        None if !line.trim().is_empty() => {
                            println!("Unknown command '{}'. {}", line.trim(), HELP);
                        }
                        None => {}
                    },
                    Ok(None) => {
                        log::info!("[Dashboard::run] stdin closed, commands disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        log::warn!("[Dashboard::run] Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("[Dashboard::run] Interrupted");
                break;
            }
        }
    }

    log::info!("[Dashboard::run] Shutting down");
    drop(resolver);
    drop(compound);
    drop(aave);
    Ok(())
}
