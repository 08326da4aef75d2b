//! Decision state transitions: ticket guard, probe invalidation, allowance ordering, wrap and bridge handling.

mod common;

use anyhow::{anyhow, Result};
use common::*;
use swap_router::engine::state::{AllowanceTag, Applied, FollowUp, ProbeRequest, SwapDecisionState};
use swap_router::{AllowanceState, Amount, DecisionMode, ExecutionMode, QuoteSourceId, SwapInput, WrapType};

fn follow_ups(applied: Applied) -> Vec<FollowUp> {
    match applied {
        Applied::Current(follow_ups) => follow_ups,
        Applied::Stale => panic!("expected a current result"),
    }
}

fn probe_in(follow_ups: Vec<FollowUp>) -> Option<ProbeRequest> {
    follow_ups.into_iter().find_map(|f| match f {
        FollowUp::Probe(request) => Some(request),
        _ => None,
    })
}

/// Tag of the allowance read or approval among `follow_ups`.
fn allowance_tag(follow_ups: &[FollowUp]) -> Option<AllowanceTag> {
    follow_ups.iter().find_map(|f| match f {
        FollowUp::ReadAllowance { tag, .. } | FollowUp::Approve { tag, .. } => Some(*tag),
        _ => None,
    })
}

/// Connect the account, set `input` and feed balance, both quotes and a
/// sufficient allowance. Returns the probe the state asked for.
fn drive_to_probe(state: &mut SwapDecisionState, input: &SwapInput, balance: u64) -> ProbeRequest {
    state.set_account(Some(account()));
    let (ticket, started) = state.set_input(input.clone());
    assert!(started.contains(&FollowUp::FetchQuotes(input.clone())));
    assert!(started.iter().any(|f| matches!(f, FollowUp::ReadBalance { .. })));

    follow_ups(state.apply_balance(ticket, Some(Amount::new(&tin(), balance))));
    follow_ups(state.apply_quote(ticket, amm_quote(input, 100)));
    let after_aggregator = follow_ups(state.apply_quote(ticket, aggregator_quote(input, 120, vec![])));
    assert!(after_aggregator
        .iter()
        .any(|f| matches!(f, FollowUp::ReadAllowance { spender, .. } if *spender == router())));
    let tag = allowance_tag(&after_aggregator).expect("allowance read requested");
    assert_eq!(tag.ticket, ticket);

    probe_in(follow_ups(state.apply_allowance(tag, AllowanceState::Sufficient))).expect("probe requested")
}

#[test]
fn test_probe_resolves_to_direct_call() {
    let mut state = SwapDecisionState::new(bsc());
    let input = exact_in(100);
    let probe = drive_to_probe(&mut state, &input, 200);

    let pending = state.current();
    assert_eq!(pending.preferred_source(), Some(QuoteSourceId::Aggregator));
    assert_eq!(pending.execution_mode(), Some(ExecutionMode::ViaRouterContract));
    assert!(!pending.settled);

    assert!(matches!(state.apply_probe(probe.tag, ExecutionMode::DirectCall), Applied::Current(_)));
    let decision = state.current();
    assert_eq!(decision.execution_mode(), Some(ExecutionMode::DirectCall));
    assert!(decision.settled);
}

#[test]
fn test_late_probe_for_old_ticket_is_dropped() {
    let mut state = SwapDecisionState::new(bsc());
    let probe = drive_to_probe(&mut state, &exact_in(100), 200);

    let (t2, _) = state.set_input(exact_in(90));
    let before = state.current();
    assert_eq!(before.ticket, t2);

    assert_eq!(state.apply_probe(probe.tag, ExecutionMode::DirectCall), Applied::Stale);
    assert_eq!(state.current(), before);
    assert_eq!(state.apply_quote(probe.tag.ticket, aggregator_quote(&exact_in(100), 500, vec![])), Applied::Stale);
    assert_eq!(state.current(), before);
}

#[test]
fn test_probe_invalidated_by_balance_change() {
    let mut state = SwapDecisionState::new(bsc());
    let input = exact_in(100);
    let first = drive_to_probe(&mut state, &input, 200);

    let second = probe_in(follow_ups(state.apply_balance(first.tag.ticket, Some(Amount::new(&tin(), 300u32)))))
        .expect("a fresh probe for the new balance");
    assert_eq!(second.tag.ticket, first.tag.ticket);
    assert!(second.tag.seq > first.tag.seq);

    assert_eq!(state.apply_probe(first.tag, ExecutionMode::DirectCall), Applied::Stale);
    assert!(!state.current().settled);
    assert!(matches!(state.apply_probe(second.tag, ExecutionMode::ViaRouterContract), Applied::Current(_)));
    assert_eq!(state.current().execution_mode(), Some(ExecutionMode::ViaRouterContract));
    assert!(state.current().settled);
}

#[test]
fn test_insufficient_balance_settles_without_probe() -> Result<()> {
    init_tracing();
    let mut state = SwapDecisionState::new(bsc());
    let input = exact_in(100);
    state.set_account(Some(account()));
    let (ticket, _) = state.set_input(input.clone());
    state.apply_balance(ticket, Some(Amount::new(&tin(), 50u32)));
    state.apply_quote(ticket, amm_quote(&input, 100));
    let requested = follow_ups(state.apply_quote(ticket, aggregator_quote(&input, 120, vec![])));
    let tag = allowance_tag(&requested).ok_or_else(|| anyhow!("no allowance read"))?;

    let after = follow_ups(state.apply_allowance(tag, AllowanceState::Sufficient));
    assert!(probe_in(after).is_none());
    let decision = state.current();
    assert_eq!(
        decision.mode,
        DecisionMode::Route { preferred_source: QuoteSourceId::Aggregator, execution_mode: ExecutionMode::ViaRouterContract }
    );
    assert!(decision.settled);
    Ok(())
}

#[test]
fn test_wrap_pair_skips_routers() {
    let chain = bsc();
    let mut state = SwapDecisionState::new(chain.clone());
    state.set_account(Some(account()));

    let (_, started) = state.set_input(SwapInput::exact_in(chain.native.clone(), chain.wrapped_native.clone(), 1_000u32));
    assert!(started.is_empty());
    assert_eq!(state.current().mode, DecisionMode::Wrap(WrapType::Wrap));
    assert!(state.current().settled);

    let (_, started) = state.set_input(SwapInput::exact_in(chain.wrapped_native.clone(), chain.native.clone(), 1_000u32));
    assert!(started.is_empty());
    assert_eq!(state.current().mode, DecisionMode::Wrap(WrapType::Unwrap));
}

#[test]
fn test_bridged_aggregator_route_forces_amm() {
    let mut state = SwapDecisionState::new(bsc());
    let input = exact_in(100);
    state.set_account(Some(account()));
    let (ticket, _) = state.set_input(input.clone());
    state.apply_balance(ticket, Some(Amount::new(&tin(), 1_000u32)));
    state.apply_quote(ticket, amm_quote(&input, 100));

    let after = follow_ups(state.apply_quote(ticket, aggregator_quote(&input, 1_000_000, vec![stargate_hop()])));
    assert!(after.is_empty());
    let decision = state.current();
    assert_eq!(decision.preferred_source(), Some(QuoteSourceId::Amm));
    assert_eq!(decision.execution_mode(), Some(ExecutionMode::ViaRouterContract));
    assert!(decision.settled);
}

#[test]
fn test_no_usable_quote_is_no_trade() {
    let mut state = SwapDecisionState::new(bsc());
    let input = exact_in(100);
    let (ticket, _) = state.set_input(input.clone());
    state.apply_quote(ticket, swap_router::Quote::empty(QuoteSourceId::Amm, &input));
    assert!(!state.current().settled);
    state.apply_quote(ticket, swap_router::Quote::empty(QuoteSourceId::Aggregator, &input));
    assert_eq!(state.current().mode, DecisionMode::NoTrade);
    assert!(state.current().settled);
}

#[test]
fn test_zero_amount_requests_nothing() {
    let mut state = SwapDecisionState::new(bsc());
    state.set_account(Some(account()));
    let (_, started) = state.set_input(exact_in(0));
    assert!(started.is_empty());
    assert_eq!(state.current().mode, DecisionMode::NoTrade);
    assert!(state.current().settled);
}

#[test]
fn test_native_input_skips_allowance_read() {
    let chain = bsc();
    let mut state = SwapDecisionState::new(chain.clone());
    let input = SwapInput::exact_in(chain.native.clone(), tout(), 100u32);
    state.set_account(Some(account()));
    let (ticket, _) = state.set_input(input.clone());
    state.apply_balance(ticket, Some(Amount::new(&chain.native, 500u32)));
    state.apply_quote(ticket, amm_quote(&input, 100));

    let probe = probe_in(follow_ups(state.apply_quote(ticket, aggregator_quote(&input, 120, vec![]))))
        .expect("native input goes straight to the gas probe");
    assert!(probe.native_input);
    assert_eq!(state.allowance(), AllowanceState::Sufficient);
}

#[test]
fn test_approval_marks_allowance_pending() -> Result<()> {
    init_tracing();
    let mut state = SwapDecisionState::new(bsc());
    let input = exact_in(100);
    state.set_account(Some(account()));
    let (ticket, _) = state.set_input(input.clone());
    state.apply_balance(ticket, Some(Amount::new(&tin(), 200u32)));
    state.apply_quote(ticket, amm_quote(&input, 100));
    let read = follow_ups(state.apply_quote(ticket, aggregator_quote(&input, 120, vec![])));
    let read = allowance_tag(&read).ok_or_else(|| anyhow!("no allowance read"))?;
    state.apply_allowance(read, AllowanceState::Insufficient);
    assert!(state.current().settled);

    let requested = state.request_approval();
    assert!(matches!(requested.as_slice(), [FollowUp::Approve { spender, .. }] if *spender == router()));
    assert_eq!(state.allowance(), AllowanceState::Pending);
    assert!(!state.current().settled);
    // A second request while pending is a no-op.
    assert!(state.request_approval().is_empty());

    let approval = allowance_tag(&requested).ok_or_else(|| anyhow!("no approval"))?;
    let probe = probe_in(follow_ups(state.apply_allowance(approval, AllowanceState::Sufficient)));
    assert!(probe.is_some());
    Ok(())
}

#[test]
fn test_read_started_before_approval_cannot_revoke_it() -> Result<()> {
    init_tracing();
    let mut state = SwapDecisionState::new(bsc());
    let input = exact_in(100);
    state.set_account(Some(account()));
    let (ticket, _) = state.set_input(input.clone());
    state.apply_balance(ticket, Some(Amount::new(&tin(), 200u32)));
    state.apply_quote(ticket, amm_quote(&input, 100));

    // The read is still in flight when the user approves.
    let read = follow_ups(state.apply_quote(ticket, aggregator_quote(&input, 120, vec![])));
    let read = allowance_tag(&read).ok_or_else(|| anyhow!("no allowance read"))?;
    let approval = allowance_tag(&state.request_approval()).ok_or_else(|| anyhow!("no approval"))?;
    assert_eq!(approval.ticket, read.ticket);
    assert!(approval.seq > read.seq);

    let estimate = probe_in(follow_ups(state.apply_allowance(approval, AllowanceState::Sufficient)))
        .ok_or_else(|| anyhow!("approval should start a gas estimate"))?;

    // The read reflects the chain before the approval landed.
    assert_eq!(state.apply_allowance(read, AllowanceState::Insufficient), Applied::Stale);
    assert_eq!(state.allowance(), AllowanceState::Sufficient);

    assert!(matches!(state.apply_probe(estimate.tag, ExecutionMode::DirectCall), Applied::Current(_)));
    let decision = state.current();
    assert_eq!(
        decision.mode,
        DecisionMode::Route { preferred_source: QuoteSourceId::Aggregator, execution_mode: ExecutionMode::DirectCall }
    );
    assert!(decision.settled);
    Ok(())
}

#[test]
fn test_approval_result_superseded_by_newer_read() -> Result<()> {
    let mut state = SwapDecisionState::new(bsc());
    let input = exact_in(100);
    state.set_account(Some(account()));
    let (ticket, _) = state.set_input(input.clone());
    state.apply_balance(ticket, Some(Amount::new(&tin(), 200u32)));
    state.apply_quote(ticket, amm_quote(&input, 100));
    let read = follow_ups(state.apply_quote(ticket, aggregator_quote(&input, 120, vec![])));
    let read = allowance_tag(&read).ok_or_else(|| anyhow!("no allowance read"))?;
    state.apply_allowance(read, AllowanceState::Insufficient);
    let approval = allowance_tag(&state.request_approval()).ok_or_else(|| anyhow!("no approval"))?;

    // A refreshed aggregator quote re-reads the allowance while the approval is out.
    let reread = follow_ups(state.apply_quote(ticket, aggregator_quote(&input, 130, vec![])));
    let reread = allowance_tag(&reread).ok_or_else(|| anyhow!("no allowance re-read"))?;
    assert!(reread.seq > approval.seq);

    assert_eq!(state.apply_allowance(approval, AllowanceState::Insufficient), Applied::Stale);
    assert!(!state.current().settled);
    assert!(matches!(state.apply_allowance(reread, AllowanceState::Sufficient), Applied::Current(_)));
    assert_eq!(state.allowance(), AllowanceState::Sufficient);
    Ok(())
}
