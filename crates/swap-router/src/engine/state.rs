//! The single-writer swap decision state.
//!
//! Every watched input (the input tuple, the connected account, both quotes,
//! allowance, balance and the latest gas probe) lives here. Each mutation
//! re-derives the decision from scratch and publishes it when it differs from
//! the previous one. Asynchronous results carry the [`InputTicket`] they were
//! issued under and are dropped once a newer tuple has been set.

use alloy_primitives::Address;
use async_stream::stream;
use futures::Stream;
use num_traits::Zero;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chains::ChainConfig;
use crate::engine::comparator;
use crate::engine::gate::{self, GateContext, GateVerdict};
use crate::types::{
    AllowanceState, Amount, Currency, DecisionMode, ExecutionMode, InputTicket, Quote, QuoteSourceId, SwapDecision,
    SwapInput, WrapType,
};
use crate::wrap::wrap_type;

/// Identifies one gas probe: the tuple it belongs to and the gate inputs it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTag {
    pub ticket: InputTicket,
    pub seq: u64,
}

/// Identifies one allowance read or approval. Reads started before a later
/// read or approval carry an older `seq` and are dropped on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceTag {
    pub ticket: InputTicket,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub tag: ProbeTag,
    pub quote: Quote,
    pub account: Address,
    pub allowance: AllowanceState,
    pub balance: Amount,
    pub native_input: bool,
}

impl ProbeRequest {
    pub fn gate_context(&self) -> GateContext<'_> {
        GateContext {
            account: Some(self.account),
            allowance: self.allowance,
            balance: Some(&self.balance),
            input_amount: &self.quote.input_amount,
            native_input: self.native_input,
        }
    }
}

/// Asynchronous work a transition asks the engine to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    FetchQuotes(SwapInput),
    ReadBalance { account: Address, currency: Currency },
    ReadAllowance { tag: AllowanceTag, account: Address, spender: Address, token: Currency, required: Amount },
    Approve { tag: AllowanceTag, account: Address, spender: Address, token: Currency },
    Probe(ProbeRequest),
}

/// Result of applying an asynchronous result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Current(Vec<FollowUp>),
    /// Computed for a superseded tuple and discarded.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Idle,
    InFlight(u64),
    Resolved(u64, ExecutionMode),
}

pub struct SwapDecisionState {
    chain: ChainConfig,
    ticket: InputTicket,
    input: Option<SwapInput>,
    wrap: WrapType,
    account: Option<Address>,
    amm_quote: Option<Quote>,
    aggregator_quote: Option<Quote>,
    allowance: AllowanceState,
    allowance_pending: bool,
    allowance_seq: u64,
    balance: Option<Amount>,
    balance_pending: bool,
    probe_seq: u64,
    probe: ProbeState,
    decisions: watch::Sender<SwapDecision>,
}

impl SwapDecisionState {
    pub fn new(chain: ChainConfig) -> Self {
        let initial = SwapDecision { ticket: InputTicket::default(), mode: DecisionMode::NoTrade, settled: true };
        let (decisions, _) = watch::channel(initial);
        Self {
            chain,
            ticket: InputTicket::default(),
            input: None,
            wrap: WrapType::NotApplicable,
            account: None,
            amm_quote: None,
            aggregator_quote: None,
            allowance: AllowanceState::Unknown,
            allowance_pending: false,
            allowance_seq: 0,
            balance: None,
            balance_pending: false,
            probe_seq: 0,
            probe: ProbeState::Idle,
            decisions,
        }
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn ticket(&self) -> InputTicket {
        self.ticket
    }

    pub fn input(&self) -> Option<&SwapInput> {
        self.input.as_ref()
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn allowance(&self) -> AllowanceState {
        self.allowance
    }

    pub fn quote(&self, source: QuoteSourceId) -> Option<&Quote> {
        match source {
            QuoteSourceId::Amm => self.amm_quote.as_ref(),
            QuoteSourceId::Aggregator => self.aggregator_quote.as_ref(),
        }
    }

    pub fn current(&self) -> SwapDecision {
        *self.decisions.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SwapDecision> {
        self.decisions.subscribe()
    }

    /// Every superseding decision, starting after the current one.
    pub fn changes(&self) -> impl Stream<Item = SwapDecision> {
        decision_stream(self.subscribe())
    }

    /// Replace the input tuple. Everything computed for the old tuple is
    /// invalidated and a wrap pair is decided before any quote is requested.
    pub fn set_input(&mut self, input: SwapInput) -> (InputTicket, Vec<FollowUp>) {
        self.wrap = wrap_type(&self.chain, &input.input, &input.output);
        self.input = Some(input);
        self.reset_for_new_ticket()
    }

    /// Connect, switch or disconnect the wallet. Balances and allowances are
    /// account-specific, so this starts a new ticket as well.
    pub fn set_account(&mut self, account: Option<Address>) -> (InputTicket, Vec<FollowUp>) {
        self.account = account;
        self.reset_for_new_ticket()
    }

    fn reset_for_new_ticket(&mut self) -> (InputTicket, Vec<FollowUp>) {
        self.ticket = self.ticket.next();
        self.amm_quote = None;
        self.aggregator_quote = None;
        self.allowance = AllowanceState::Unknown;
        self.allowance_pending = false;
        self.allowance_seq = 0;
        self.balance = None;
        self.balance_pending = false;
        self.invalidate_probe();

        let mut follow_ups = Vec::new();
        if let Some(input) = self.tradeable_input().cloned() {
            if let Some(account) = self.account {
                self.balance_pending = true;
                follow_ups.push(FollowUp::ReadBalance { account, currency: input.input.clone() });
            }
            follow_ups.push(FollowUp::FetchQuotes(input));
        } else if self.wrap != WrapType::NotApplicable {
            debug!(ticket = %self.ticket, wrap = ?self.wrap, "wrap pair; routers skipped");
        }
        (self.ticket, self.finish(follow_ups))
    }

    /// Input that needs routing: set, not a wrap pair, non-zero.
    fn tradeable_input(&self) -> Option<&SwapInput> {
        self.input
            .as_ref()
            .filter(|input| self.wrap == WrapType::NotApplicable && !input.typed_amount.is_zero())
    }

    fn is_current(&self, ticket: InputTicket, what: &str) -> bool {
        if ticket != self.ticket {
            debug!(stale = %ticket, current = %self.ticket, what, "dropping stale result");
            return false;
        }
        true
    }

    pub fn apply_quote(&mut self, ticket: InputTicket, quote: Quote) -> Applied {
        if !self.is_current(ticket, "quote") {
            return Applied::Stale;
        }
        let mut follow_ups = Vec::new();
        match quote.source {
            QuoteSourceId::Amm => self.amm_quote = Some(quote),
            QuoteSourceId::Aggregator => {
                if quote.requires_bridge() {
                    warn!(ticket = %ticket, hops = quote.bridge_hops().len(), "aggregator route needs a bridge; AMM forced");
                }
                follow_ups.extend(self.allowance_read_for(&quote));
                self.aggregator_quote = Some(quote);
                self.invalidate_probe();
            }
        }
        Applied::Current(self.finish(follow_ups))
    }

    fn allowance_read_for(&mut self, quote: &Quote) -> Option<FollowUp> {
        let input = self.input.as_ref()?;
        let route = quote.aggregator_route()?;
        if quote.is_empty || quote.requires_bridge() {
            return None;
        }
        if input.input.is_native() {
            self.allowance = AllowanceState::Sufficient;
            return None;
        }
        let account = self.account?;
        let (spender, token) = (route.router, input.input.clone());
        let tag = self.next_allowance_tag();
        Some(FollowUp::ReadAllowance { tag, account, spender, token, required: quote.input_amount.clone() })
    }

    fn next_allowance_tag(&mut self) -> AllowanceTag {
        self.allowance_seq += 1;
        self.allowance_pending = true;
        AllowanceTag { ticket: self.ticket, seq: self.allowance_seq }
    }

    /// Only the result of the latest allowance read or approval is applied.
    pub fn apply_allowance(&mut self, tag: AllowanceTag, allowance: AllowanceState) -> Applied {
        if !self.is_current(tag.ticket, "allowance") {
            return Applied::Stale;
        }
        if tag.seq != self.allowance_seq {
            debug!(seq = tag.seq, current = self.allowance_seq, "dropping superseded allowance result");
            return Applied::Stale;
        }
        self.allowance = allowance;
        self.allowance_pending = false;
        self.invalidate_probe();
        Applied::Current(self.finish(Vec::new()))
    }

    /// A `None` balance means the read failed; the gate treats it as insufficient.
    pub fn apply_balance(&mut self, ticket: InputTicket, balance: Option<Amount>) -> Applied {
        if !self.is_current(ticket, "balance") {
            return Applied::Stale;
        }
        self.balance = balance;
        self.balance_pending = false;
        self.invalidate_probe();
        Applied::Current(self.finish(Vec::new()))
    }

    pub fn apply_probe(&mut self, tag: ProbeTag, mode: ExecutionMode) -> Applied {
        if !self.is_current(tag.ticket, "gas probe") {
            return Applied::Stale;
        }
        if self.probe != ProbeState::InFlight(tag.seq) {
            debug!(seq = tag.seq, current = self.probe_seq, "dropping probe for outdated gate inputs");
            return Applied::Stale;
        }
        self.probe = ProbeState::Resolved(tag.seq, mode);
        Applied::Current(self.finish(Vec::new()))
    }

    /// Re-read the input balance for the current tuple.
    pub fn refresh_balance(&mut self) -> Vec<FollowUp> {
        let (Some(account), Some(input)) = (self.account, self.tradeable_input().cloned()) else {
            return Vec::new();
        };
        self.balance_pending = true;
        self.finish(vec![FollowUp::ReadBalance { account, currency: input.input }])
    }

    /// Ask the allowance tracker to approve the aggregator router. Only the
    /// resulting state transition is observed here.
    pub fn request_approval(&mut self) -> Vec<FollowUp> {
        let Some(account) = self.account else {
            return Vec::new();
        };
        let Some(input) = self.input.as_ref().filter(|i| !i.input.is_native()) else {
            return Vec::new();
        };
        let Some(route) = self.aggregator_quote.as_ref().and_then(|q| q.aggregator_route()) else {
            return Vec::new();
        };
        if matches!(self.allowance, AllowanceState::Sufficient | AllowanceState::Pending) {
            return Vec::new();
        }
        let (spender, token) = (route.router, input.input.clone());
        let tag = self.next_allowance_tag();
        let follow_up = FollowUp::Approve { tag, account, spender, token };
        self.allowance = AllowanceState::Pending;
        self.invalidate_probe();
        self.finish(vec![follow_up])
    }

    fn invalidate_probe(&mut self) {
        self.probe_seq += 1;
        self.probe = ProbeState::Idle;
    }

    fn gate_context(&self) -> Option<GateContext<'_>> {
        let input = self.input.as_ref()?;
        let quote = self.aggregator_quote.as_ref()?;
        Some(GateContext {
            account: self.account,
            allowance: self.allowance,
            balance: self.balance.as_ref(),
            input_amount: &quote.input_amount,
            native_input: input.input.is_native(),
        })
    }

    fn preferred_source(&self) -> Option<QuoteSourceId> {
        let input = self.tradeable_input()?;
        Some(comparator::compare(self.amm_quote.as_ref(), self.aggregator_quote.as_ref(), input.side))
    }

    /// Start a gas probe if the aggregator is preferred, the precheck passes
    /// and no probe exists yet for the current gate inputs.
    fn next_probe(&mut self) -> Option<FollowUp> {
        if self.preferred_source()? != QuoteSourceId::Aggregator || self.probe != ProbeState::Idle {
            return None;
        }
        if self.allowance_pending || self.balance_pending {
            return None;
        }
        if gate::precheck(&self.gate_context()?) != GateVerdict::NeedsGasEstimate {
            return None;
        }
        let request = ProbeRequest {
            tag: ProbeTag { ticket: self.ticket, seq: self.probe_seq },
            quote: self.aggregator_quote.clone()?,
            account: self.account?,
            allowance: self.allowance,
            balance: self.balance.clone()?,
            native_input: self.input.as_ref()?.input.is_native(),
        };
        self.probe = ProbeState::InFlight(self.probe_seq);
        Some(FollowUp::Probe(request))
    }

    fn finish(&mut self, mut follow_ups: Vec<FollowUp>) -> Vec<FollowUp> {
        follow_ups.extend(self.next_probe());
        self.publish();
        follow_ups
    }

    fn aggregator_execution_mode(&self) -> ExecutionMode {
        let Some(ctx) = self.gate_context() else {
            return ExecutionMode::ViaRouterContract;
        };
        match gate::precheck(&ctx) {
            GateVerdict::Settled(mode) => mode,
            GateVerdict::NeedsGasEstimate => match self.probe {
                ProbeState::Resolved(seq, mode) if seq == self.probe_seq => mode,
                _ => ExecutionMode::ViaRouterContract,
            },
        }
    }

    fn derive_mode(&self) -> DecisionMode {
        if self.input.is_none() {
            return DecisionMode::NoTrade;
        }
        if self.wrap != WrapType::NotApplicable {
            return DecisionMode::Wrap(self.wrap);
        }
        let Some(preferred_source) = self.preferred_source() else {
            return DecisionMode::NoTrade;
        };
        let amm_usable = self.amm_quote.as_ref().is_some_and(|q| !q.is_empty);
        let aggregator_usable = self.aggregator_quote.as_ref().is_some_and(|q| !q.is_empty && !q.requires_bridge());
        let both_arrived = self.amm_quote.is_some() && self.aggregator_quote.is_some();
        if both_arrived && !amm_usable && !aggregator_usable {
            return DecisionMode::NoTrade;
        }
        let execution_mode = match preferred_source {
            QuoteSourceId::Amm => ExecutionMode::ViaRouterContract,
            QuoteSourceId::Aggregator => self.aggregator_execution_mode(),
        };
        DecisionMode::Route { preferred_source, execution_mode }
    }

    fn is_settled(&self, mode: &DecisionMode) -> bool {
        let preferred = match mode {
            DecisionMode::Wrap(_) => return true,
            DecisionMode::NoTrade => {
                return self.tradeable_input().is_none() || (self.amm_quote.is_some() && self.aggregator_quote.is_some())
            }
            DecisionMode::Route { preferred_source, .. } => *preferred_source,
        };
        if self.amm_quote.is_none() || self.aggregator_quote.is_none() {
            return false;
        }
        if preferred == QuoteSourceId::Amm {
            return true;
        }
        if self.allowance_pending || self.balance_pending {
            return false;
        }
        match self.gate_context().map(|ctx| gate::precheck(&ctx)) {
            Some(GateVerdict::NeedsGasEstimate) => matches!(self.probe, ProbeState::Resolved(seq, _) if seq == self.probe_seq),
            _ => true,
        }
    }

    /// Derive the decision for the current snapshot. Pure.
    pub fn recompute(&self) -> SwapDecision {
        let mode = self.derive_mode();
        SwapDecision { ticket: self.ticket, mode, settled: self.is_settled(&mode) }
    }

    fn publish(&mut self) {
        let next = self.recompute();
        let changed = self.decisions.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(ticket = %next.ticket, mode = ?next.mode, settled = next.settled, "swap decision superseded");
        }
    }
}

/// Turn a decision receiver into a stream of superseding decisions.
pub fn decision_stream(mut decisions: watch::Receiver<SwapDecision>) -> impl Stream<Item = SwapDecision> {
    stream! {
        while decisions.changed().await.is_ok() {
            let decision = *decisions.borrow_and_update();
            yield decision;
        }
    }
}
