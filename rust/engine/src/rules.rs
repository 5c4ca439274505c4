use serde::{Deserialize, Serialize};

use crate::errors::GameError;
use crate::player::PlayerAction;

/// The kinds of action a seat can take, without amounts.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
}

/// One legal action offered to the seat about to act, with the chip
/// bounds that apply to it. `Bet` and `Raise` bounds are round totals.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PossibleAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl PossibleAction {
    fn plain(kind: ActionKind) -> Self {
        Self {
            kind,
            min: None,
            max: None,
        }
    }

    fn bounded(kind: ActionKind, min: u32, max: u32) -> Self {
        Self {
            kind,
            min: Some(min),
            max: Some(max),
        }
    }
}

/// An action that has passed validation, carrying the exact chip amount
/// the engine will commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedAction {
    Fold,
    Check,
    /// Pay this many chips to match the current bet
    Call(u32),
    /// Open the betting to this round total
    Bet(u32),
    /// Raise to this round total
    Raise(u32),
    /// Commit the whole remaining stack
    AllIn(u32),
}

/// Betting context for one seat: everything the legality table needs.
#[derive(Debug, Copy, Clone)]
pub struct BetContext {
    pub stack: u32,
    pub round_wager: u32,
    pub current_bet: u32,
    pub min_raise: u32,
    pub big_blind: u32,
}

impl BetContext {
    fn to_call(&self) -> u32 {
        self.current_bet.saturating_sub(self.round_wager)
    }
}

/// Enumerates the legal actions for a seat facing `ctx`.
///
/// - Fold only when there is something to call (a free check is never
///   surrendered).
/// - Check only when the seat already matches the current bet.
/// - Call pays `min(stack, current bet - round wager)`.
/// - Bet opens an unopened round, between the big blind and the stack.
/// - Raise re-opens an opened round, to between `current bet + minimum
///   raise` and `stack + round wager`.
/// - All-in whenever chips remain.
pub fn possible_actions(ctx: BetContext) -> Vec<PossibleAction> {
    let mut actions = Vec::with_capacity(4);
    let to_call = ctx.to_call();

    if to_call > 0 {
        actions.push(PossibleAction::plain(ActionKind::Fold));
    } else {
        actions.push(PossibleAction::plain(ActionKind::Check));
    }

    if to_call > 0 && ctx.stack > 0 {
        let amount = to_call.min(ctx.stack);
        actions.push(PossibleAction::bounded(ActionKind::Call, amount, amount));
    }

    if ctx.current_bet == 0 && ctx.stack >= ctx.big_blind {
        actions.push(PossibleAction::bounded(
            ActionKind::Bet,
            ctx.big_blind,
            ctx.stack,
        ));
    }

    if ctx.current_bet > 0 {
        let min_to = ctx.current_bet + ctx.min_raise;
        let max_to = ctx.stack + ctx.round_wager;
        if max_to >= min_to {
            actions.push(PossibleAction::bounded(ActionKind::Raise, min_to, max_to));
        }
    }

    if ctx.stack > 0 {
        actions.push(PossibleAction::bounded(
            ActionKind::AllIn,
            ctx.stack,
            ctx.stack,
        ));
    }

    actions
}

/// Validates a submitted action against the legality table, producing
/// the exact amount to commit. Never mutates anything; callers reject
/// atomically on `Err`.
pub fn validate_action(
    ctx: BetContext,
    action: &PlayerAction,
) -> Result<ValidatedAction, GameError> {
    let to_call = ctx.to_call();
    match action {
        PlayerAction::Fold => {
            if to_call == 0 {
                Err(GameError::IllegalAction(
                    "cannot fold when a check is free".into(),
                ))
            } else {
                Ok(ValidatedAction::Fold)
            }
        }
        PlayerAction::Check => {
            if to_call == 0 {
                Ok(ValidatedAction::Check)
            } else {
                Err(GameError::IllegalAction(format!(
                    "cannot check facing a bet of {to_call}"
                )))
            }
        }
        PlayerAction::Call => {
            if to_call == 0 {
                Err(GameError::IllegalAction("nothing to call".into()))
            } else if ctx.stack == 0 {
                Err(GameError::IllegalAction("no chips left to call".into()))
            } else {
                Ok(ValidatedAction::Call(to_call.min(ctx.stack)))
            }
        }
        PlayerAction::Bet(amount) => {
            if ctx.current_bet > 0 {
                return Err(GameError::IllegalAction(
                    "betting round already opened, raise instead".into(),
                ));
            }
            if ctx.stack < ctx.big_blind {
                return Err(GameError::IllegalAction(
                    "stack below the minimum bet, go all-in instead".into(),
                ));
            }
            if *amount < ctx.big_blind || *amount > ctx.stack {
                return Err(GameError::AmountOutOfRange {
                    amount: *amount,
                    min: ctx.big_blind,
                    max: ctx.stack,
                });
            }
            Ok(ValidatedAction::Bet(*amount))
        }
        PlayerAction::Raise(to) => {
            if ctx.current_bet == 0 {
                return Err(GameError::IllegalAction(
                    "nothing to raise, bet instead".into(),
                ));
            }
            let min_to = ctx.current_bet + ctx.min_raise;
            let max_to = ctx.stack + ctx.round_wager;
            if max_to < min_to {
                return Err(GameError::IllegalAction(
                    "stack too short for a full raise, go all-in instead".into(),
                ));
            }
            if *to < min_to || *to > max_to {
                return Err(GameError::AmountOutOfRange {
                    amount: *to,
                    min: min_to,
                    max: max_to,
                });
            }
            Ok(ValidatedAction::Raise(*to))
        }
        PlayerAction::AllIn => {
            if ctx.stack == 0 {
                Err(GameError::IllegalAction("no chips left".into()))
            } else {
                Ok(ValidatedAction::AllIn(ctx.stack))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(stack: u32, round_wager: u32, current_bet: u32, min_raise: u32) -> BetContext {
        BetContext {
            stack,
            round_wager,
            current_bet,
            min_raise,
            big_blind: 20,
        }
    }

    fn kinds(actions: &[PossibleAction]) -> Vec<ActionKind> {
        actions.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn unopened_round_offers_check_bet_all_in() {
        let actions = possible_actions(ctx(1_000, 0, 0, 20));
        assert_eq!(
            kinds(&actions),
            vec![ActionKind::Check, ActionKind::Bet, ActionKind::AllIn]
        );
        let bet = &actions[1];
        assert_eq!(bet.min, Some(20));
        assert_eq!(bet.max, Some(1_000));
    }

    #[test]
    fn facing_a_bet_offers_fold_call_raise_all_in() {
        let actions = possible_actions(ctx(1_000, 20, 60, 40));
        assert_eq!(
            kinds(&actions),
            vec![
                ActionKind::Fold,
                ActionKind::Call,
                ActionKind::Raise,
                ActionKind::AllIn
            ]
        );
        let call = &actions[1];
        assert_eq!(call.min, Some(40));
        let raise = &actions[2];
        assert_eq!(raise.min, Some(100));
        assert_eq!(raise.max, Some(1_020));
    }

    #[test]
    fn short_stack_gets_no_raise_entry() {
        // can only call or shove, the full raise is out of reach
        let actions = possible_actions(ctx(50, 0, 60, 40));
        assert_eq!(
            kinds(&actions),
            vec![ActionKind::Fold, ActionKind::Call, ActionKind::AllIn]
        );
        assert_eq!(actions[1].min, Some(50));
    }

    #[test]
    fn fold_is_rejected_when_check_is_free() {
        let err = validate_action(ctx(1_000, 20, 20, 20), &PlayerAction::Fold).unwrap_err();
        assert!(matches!(err, GameError::IllegalAction(_)));
    }

    #[test]
    fn check_facing_a_bet_is_rejected() {
        let err = validate_action(ctx(1_000, 0, 60, 40), &PlayerAction::Check).unwrap_err();
        assert!(matches!(err, GameError::IllegalAction(_)));
    }

    #[test]
    fn raise_below_minimum_is_out_of_range() {
        let err = validate_action(ctx(1_000, 20, 60, 40), &PlayerAction::Raise(80)).unwrap_err();
        assert_eq!(
            err,
            GameError::AmountOutOfRange {
                amount: 80,
                min: 100,
                max: 1_020
            }
        );
    }

    #[test]
    fn short_call_is_clamped_to_stack() {
        let validated = validate_action(ctx(30, 0, 100, 20), &PlayerAction::Call).unwrap();
        assert_eq!(validated, ValidatedAction::Call(30));
    }

    #[test]
    fn all_in_is_always_available_with_chips() {
        let validated = validate_action(ctx(5, 0, 100, 20), &PlayerAction::AllIn).unwrap();
        assert_eq!(validated, ValidatedAction::AllIn(5));
    }
}
