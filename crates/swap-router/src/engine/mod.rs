//! The swap decision engine: a single event loop that owns the decision
//! state and runs every quote fetch, balance/allowance read and gas probe as
//! a spawned task whose result is posted back tagged with its ticket.

pub mod comparator;
pub mod gate;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use futures::Stream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::chains::ChainConfig;
use crate::config::AppConfig;
use crate::sources::{AllowanceTracker, BalanceProvider, GasEstimator, QuoteSource};
use crate::types::{AllowanceState, Amount, ExecutionMode, InputTicket, Quote, Result, RouterError, SwapDecision, SwapInput};
use state::{AllowanceTag, Applied, FollowUp, ProbeTag, SwapDecisionState};

pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(8);

/// The external collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub amm: Arc<dyn QuoteSource>,
    pub aggregator: Arc<dyn QuoteSource>,
    pub allowances: Arc<dyn AllowanceTracker>,
    pub balances: Arc<dyn BalanceProvider>,
    pub gas: Arc<dyn GasEstimator>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on a single quote fetch; a timeout counts as an empty quote.
    pub quote_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { quote_timeout: DEFAULT_QUOTE_TIMEOUT }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { quote_timeout: Duration::from_millis(config.quote_timeout_ms) }
    }
}

#[derive(Debug)]
enum Command {
    SetInput(SwapInput),
    SetAccount(Option<Address>),
    RefreshBalances,
    Approve,
    /// Replies with the current ticket once every earlier command is applied.
    Sync(oneshot::Sender<InputTicket>),
    Shutdown,
}

#[derive(Debug)]
enum Completion {
    Quote { ticket: InputTicket, quote: Quote },
    Allowance { tag: AllowanceTag, allowance: AllowanceState },
    Balance { ticket: InputTicket, balance: Option<Amount> },
    Probe { tag: ProbeTag, mode: ExecutionMode },
}

pub struct SwapDecisionEngine {
    state: SwapDecisionState,
    collaborators: Collaborators,
    settings: EngineSettings,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl SwapDecisionEngine {
    pub fn new(chain: ChainConfig, collaborators: Collaborators, settings: EngineSettings) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self { state: SwapDecisionState::new(chain), collaborators, settings, completions_tx, completions_rx }
    }

    /// Start the event loop on the current tokio runtime.
    pub fn spawn(self) -> (SwapDecisionHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = SwapDecisionHandle { commands: commands_tx, decisions: self.state.subscribe() };
        let task = tokio::spawn(self.run(commands_rx));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(chain = self.state.chain().name, "swap decision engine started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(completion) = self.completions_rx.recv() => self.handle_completion(completion),
            }
        }
        info!("swap decision engine stopped");
    }

    /// Returns `false` once the loop should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        let follow_ups = match command {
            Command::SetInput(input) => self.state.set_input(input).1,
            Command::SetAccount(account) => self.state.set_account(account).1,
            Command::RefreshBalances => self.state.refresh_balance(),
            Command::Approve => self.state.request_approval(),
            Command::Sync(reply) => {
                let _ = reply.send(self.state.ticket());
                Vec::new()
            }
            Command::Shutdown => return false,
        };
        self.dispatch(follow_ups);
        true
    }

    fn handle_completion(&mut self, completion: Completion) {
        let applied = match completion {
            Completion::Quote { ticket, quote } => self.state.apply_quote(ticket, quote),
            Completion::Allowance { tag, allowance } => self.state.apply_allowance(tag, allowance),
            Completion::Balance { ticket, balance } => self.state.apply_balance(ticket, balance),
            Completion::Probe { tag, mode } => self.state.apply_probe(tag, mode),
        };
        if let Applied::Current(follow_ups) = applied {
            self.dispatch(follow_ups);
        }
    }

    fn dispatch(&self, follow_ups: Vec<FollowUp>) {
        let ticket = self.state.ticket();
        for follow_up in follow_ups {
            match follow_up {
                FollowUp::FetchQuotes(input) => {
                    self.spawn_quote(ticket, self.collaborators.amm.clone(), input.clone());
                    self.spawn_quote(ticket, self.collaborators.aggregator.clone(), input);
                }
                FollowUp::ReadBalance { account, currency } => {
                    let balances = self.collaborators.balances.clone();
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let balance = match balances.get_balance(account, &currency).await {
                            Ok(balance) => Some(balance),
                            Err(e) => {
                                warn!(error = %e, "balance read failed");
                                None
                            }
                        };
                        let _ = tx.send(Completion::Balance { ticket, balance });
                    });
                }
                FollowUp::ReadAllowance { tag, account, spender, token, required } => {
                    let allowances = self.collaborators.allowances.clone();
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let allowance = allowances
                            .get_state(account, spender, &token, &required)
                            .await
                            .unwrap_or_else(|e| {
                                warn!(error = %e, "allowance check failed; treating as insufficient");
                                AllowanceState::Insufficient
                            });
                        let _ = tx.send(Completion::Allowance { tag, allowance });
                    });
                }
                FollowUp::Approve { tag, account, spender, token } => {
                    let allowances = self.collaborators.allowances.clone();
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let allowance = allowances.approve(account, spender, &token).await.unwrap_or_else(|e| {
                            warn!(error = %e, "approval failed");
                            AllowanceState::Insufficient
                        });
                        let _ = tx.send(Completion::Allowance { tag, allowance });
                    });
                }
                FollowUp::Probe(request) => {
                    let gas = self.collaborators.gas.clone();
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let mode = gate::probe(&request.gate_context(), &request.quote, gas.as_ref()).await;
                        debug!(ticket = %request.tag.ticket, seq = request.tag.seq, ?mode, "gas probe resolved");
                        let _ = tx.send(Completion::Probe { tag: request.tag, mode });
                    });
                }
            }
        }
    }

    fn spawn_quote(&self, ticket: InputTicket, source: Arc<dyn QuoteSource>, input: SwapInput) {
        let tx = self.completions_tx.clone();
        let limit = self.settings.quote_timeout;
        tokio::spawn(async move {
            let id = source.id();
            let mut quote = match timeout(limit, source.get_quote(&input)).await {
                Ok(Ok(quote)) => quote,
                Ok(Err(e)) => {
                    warn!(source = %id, error = %e, "quote unavailable");
                    Quote::empty(id, &input)
                }
                Err(_) => {
                    warn!(source = %id, timeout_ms = limit.as_millis() as u64, "quote timed out");
                    Quote::empty(id, &input)
                }
            };
            quote.source = id;
            let _ = tx.send(Completion::Quote { ticket, quote });
        });
    }
}

/// Cloneable front door to a running engine.
#[derive(Clone)]
pub struct SwapDecisionHandle {
    commands: mpsc::UnboundedSender<Command>,
    decisions: watch::Receiver<SwapDecision>,
}

impl SwapDecisionHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| RouterError::ChannelClosed)
    }

    pub fn set_input(&self, input: SwapInput) -> Result<()> {
        self.send(Command::SetInput(input))
    }

    pub fn set_account(&self, account: Option<Address>) -> Result<()> {
        self.send(Command::SetAccount(account))
    }

    pub fn refresh_balances(&self) -> Result<()> {
        self.send(Command::RefreshBalances)
    }

    /// Request approval of the aggregator router for the current input token.
    pub fn approve(&self) -> Result<()> {
        self.send(Command::Approve)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub fn current(&self) -> SwapDecision {
        *self.decisions.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SwapDecision> {
        self.decisions.clone()
    }

    pub fn changes(&self) -> impl Stream<Item = SwapDecision> {
        state::decision_stream(self.subscribe())
    }

    /// Wait for the decision of the latest command to settle.
    pub async fn settled(&self) -> Result<SwapDecision> {
        let (reply, ticket) = oneshot::channel();
        self.send(Command::Sync(reply))?;
        let ticket = ticket.await.map_err(|_| RouterError::ChannelClosed)?;
        self.wait_for(|d| d.ticket == ticket && d.settled).await
    }

    /// Wait until a decision matching `predicate` is published.
    pub async fn wait_for(&self, predicate: impl FnMut(&SwapDecision) -> bool) -> Result<SwapDecision> {
        let mut rx = self.subscribe();
        let decision = rx.wait_for(predicate).await.map_err(|_| RouterError::ChannelClosed)?;
        Ok(*decision)
    }
}
