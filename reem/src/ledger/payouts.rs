//! Pure settlement math: each operation is expressed as a draft batch that
//! the store applies atomically.
//!
//! Every batch balances to zero. The house account is the counterparty for
//! stake collection and payout funding, which also makes the win-type
//! multipliers (double and triple pots) conserve.

use super::models::{
    SeatAccount, TableId, TransactionDraft, TransactionKind, HOUSE_USER_ID,
};
use crate::game::{SeatStatus, WinType};
use uuid::Uuid;

/// Per-winner payout for a pot of `pot` split between `winner_count` seats.
///
/// | win type                  | payout        |
/// |---------------------------|---------------|
/// | REEM, DROP_WIN, FORFEIT   | pot           |
/// | IMMEDIATE_50              | 2 x pot       |
/// | SPECIAL_WIN               | 3 x pot       |
/// | REGULAR_WIN, STOCK_EMPTY, DROP_CAUGHT | pot / winners |
pub fn winner_payout(win_type: WinType, pot: i64, winner_count: usize) -> i64 {
    match win_type {
        WinType::Reem | WinType::DropWin | WinType::ForfeitWin => pot,
        WinType::Immediate50 => 2 * pot,
        WinType::SpecialWin => 3 * pot,
        WinType::RegularWin | WinType::StockEmpty | WinType::DropCaught => {
            pot / winner_count.max(1) as i64
        }
    }
}

/// Stake deduction at hand start: every seat pays `stake` into the house.
pub fn stake_entries(
    seats: &[SeatAccount],
    stake: i64,
    table_id: TableId,
    game_id: Uuid,
) -> Vec<TransactionDraft> {
    let mut drafts: Vec<TransactionDraft> = seats
        .iter()
        .map(|seat| TransactionDraft {
            id: format!("stake_{game_id}_{}", seat.user_id),
            user_id: seat.user_id,
            table_id,
            game_id,
            kind: TransactionKind::Stake,
            amount: -stake,
            win_type: None,
        })
        .collect();

    drafts.push(TransactionDraft {
        id: format!("stake_{game_id}_house"),
        user_id: HOUSE_USER_ID,
        table_id,
        game_id,
        kind: TransactionKind::Stake,
        amount: stake * seats.len() as i64,
        win_type: None,
    });
    drafts
}

/// Payout distribution at hand end. Winners are indexes into `seats`.
/// Integer pot splits leave the remainder with the first winner.
pub fn payout_entries(
    seats: &[SeatAccount],
    winners: &[usize],
    win_type: WinType,
    stake: i64,
    table_id: TableId,
    game_id: Uuid,
) -> Vec<TransactionDraft> {
    let pot = stake * seats.len() as i64;
    let per_winner = winner_payout(win_type, pot, winners.len());
    let remainder = match win_type {
        WinType::RegularWin | WinType::StockEmpty | WinType::DropCaught => {
            pot - per_winner * winners.len() as i64
        }
        _ => 0,
    };

    let mut total = 0;
    let mut drafts = Vec::with_capacity(winners.len() + 1);
    for (i, &winner) in winners.iter().enumerate() {
        let seat = &seats[winner];
        let amount = if i == 0 { per_winner + remainder } else { per_winner };
        total += amount;
        drafts.push(TransactionDraft {
            id: format!("payout_{game_id}_{}", seat.user_id),
            user_id: seat.user_id,
            table_id,
            game_id,
            kind: TransactionKind::Payout,
            amount,
            win_type: Some(win_type),
        });
    }

    drafts.push(TransactionDraft {
        id: format!("payout_{game_id}_house"),
        user_id: HOUSE_USER_ID,
        table_id,
        game_id,
        kind: TransactionKind::Payout,
        amount: -total,
        win_type: Some(win_type),
    });
    drafts
}

/// Drop-caught penalty: the dropper pays `stake` to every seat whose score
/// is strictly below the dropper's. Seats that left the hand are excluded,
/// matching winner selection: a frozen dead hand collects nothing.
pub fn drop_penalty_entries(
    seats: &[SeatAccount],
    dropper_idx: usize,
    round_scores: &[u32],
    statuses: &[SeatStatus],
    stake: i64,
    table_id: TableId,
    game_id: Uuid,
) -> Vec<TransactionDraft> {
    let dropper_score = round_scores[dropper_idx];
    let beneficiaries: Vec<usize> = (0..seats.len())
        .filter(|&i| {
            i != dropper_idx
                && statuses[i] != SeatStatus::Left
                && round_scores[i] < dropper_score
        })
        .collect();
    if beneficiaries.is_empty() {
        return Vec::new();
    }

    let dropper = &seats[dropper_idx];
    let mut drafts = Vec::with_capacity(beneficiaries.len() + 1);
    drafts.push(TransactionDraft {
        id: format!("penalty_{game_id}_{}_paid", dropper.user_id),
        user_id: dropper.user_id,
        table_id,
        game_id,
        kind: TransactionKind::Penalty,
        amount: -stake * beneficiaries.len() as i64,
        win_type: Some(WinType::DropCaught),
    });
    for idx in beneficiaries {
        let seat = &seats[idx];
        drafts.push(TransactionDraft {
            id: format!("penalty_{game_id}_{}_{}", dropper.user_id, seat.user_id),
            user_id: seat.user_id,
            table_id,
            game_id,
            kind: TransactionKind::Penalty,
            amount: stake,
            win_type: Some(WinType::DropCaught),
        });
    }
    drafts
}

/// Refund entries for an abandoned hand: stakes flow back from the house.
pub fn refund_entries(
    seats: &[SeatAccount],
    stake: i64,
    table_id: TableId,
    game_id: Uuid,
) -> Vec<TransactionDraft> {
    let mut drafts: Vec<TransactionDraft> = seats
        .iter()
        .map(|seat| TransactionDraft {
            id: format!("refund_{game_id}_{}", seat.user_id),
            user_id: seat.user_id,
            table_id,
            game_id,
            kind: TransactionKind::Payout,
            amount: stake,
            win_type: None,
        })
        .collect();
    drafts.push(TransactionDraft {
        id: format!("refund_{game_id}_house"),
        user_id: HOUSE_USER_ID,
        table_id,
        game_id,
        kind: TransactionKind::Payout,
        amount: -stake * seats.len() as i64,
        win_type: None,
    });
    drafts
}
