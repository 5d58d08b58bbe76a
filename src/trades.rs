//! Trade proposal and settlement.
//!
//! Trades run between draft end and game end. A proposal spends quota
//! immediately; settlement swaps pick ownership atomically or not at
//! all.

use tracing::{debug, info};

use crate::error::GameError;
use crate::types::{GameRecord, Phase, Trade, TradeStatus};

fn require_done(record: &GameRecord) -> Result<(), GameError> {
    if record.phase != Phase::Done {
        return Err(GameError::WrongPhase {
            expected: Phase::Done,
            actual: record.phase,
        });
    }
    Ok(())
}

/// Propose a swap of `offer_ticker` for `to`'s `request_ticker`.
///
/// Ticker ownership is deliberately not validated here, only at
/// acceptance; the proposal just spends quota and queues the trade.
/// Returns the new trade id.
pub fn propose(
    record: &mut GameRecord,
    from: &str,
    to: &str,
    offer_ticker: &str,
    request_ticker: &str,
) -> Result<u64, GameError> {
    require_done(record)?;

    if from == to {
        return Err(GameError::InvalidTrade(
            "cannot trade with yourself".to_string(),
        ));
    }
    let quota = record.trade_limits.get(from).copied().unwrap_or(0);
    if quota == 0 {
        return Err(GameError::InvalidTrade(format!(
            "{} has no trade proposals left",
            from
        )));
    }

    let id = record.trades.len() as u64 + 1;
    record.trades.push(Trade {
        id,
        from_player: from.to_string(),
        to_player: to.to_string(),
        offer_ticker: offer_ticker.to_string(),
        request_ticker: request_ticker.to_string(),
        status: TradeStatus::Pending,
    });
    record.trade_limits.insert(from.to_string(), quota - 1);
    info!(
        "trade {} proposed: {} offers {} to {} for {}",
        id, from, offer_ticker, to, request_ticker
    );
    Ok(id)
}

/// Accept or reject a pending trade. Unknown or already-settled ids are
/// a silent no-op. Acceptance swaps the two picks and both players'
/// held-ticker lists in one mutation; if either referenced pick is
/// missing, nothing moves and the trade stays pending.
pub fn respond(record: &mut GameRecord, trade_id: u64, accepted: bool) -> Result<(), GameError> {
    require_done(record)?;

    let Some(trade) = record
        .trades
        .iter()
        .find(|t| t.id == trade_id && t.status == TradeStatus::Pending)
        .cloned()
    else {
        debug!("response to unknown or settled trade {}, ignoring", trade_id);
        return Ok(());
    };

    if !accepted {
        set_status(record, trade_id, TradeStatus::Rejected);
        info!("trade {} rejected", trade_id);
        return Ok(());
    }

    // Locate both picks before touching anything.
    let from_idx = record
        .picks
        .get(&trade.from_player)
        .and_then(|ps| ps.iter().position(|p| p.ticker == trade.offer_ticker))
        .ok_or_else(|| GameError::TradeInvariantViolation {
            trade_id,
            detail: format!(
                "{} no longer holds {}",
                trade.from_player, trade.offer_ticker
            ),
        })?;
    let to_idx = record
        .picks
        .get(&trade.to_player)
        .and_then(|ps| ps.iter().position(|p| p.ticker == trade.request_ticker))
        .ok_or_else(|| GameError::TradeInvariantViolation {
            trade_id,
            detail: format!(
                "{} no longer holds {}",
                trade.to_player, trade.request_ticker
            ),
        })?;

    // Swap the picks themselves (identity preserved, owner changes).
    let offered = record
        .picks
        .get_mut(&trade.from_player)
        .map(|ps| ps.remove(from_idx))
        .ok_or_else(|| GameError::TradeInvariantViolation {
            trade_id,
            detail: "from-player pick list vanished".to_string(),
        })?;
    let requested = record
        .picks
        .get_mut(&trade.to_player)
        .map(|ps| ps.remove(to_idx))
        .ok_or_else(|| GameError::TradeInvariantViolation {
            trade_id,
            detail: "to-player pick list vanished".to_string(),
        })?;
    if let Some(ps) = record.picks.get_mut(&trade.from_player) {
        ps.push(requested);
    }
    if let Some(ps) = record.picks.get_mut(&trade.to_player) {
        ps.push(offered);
    }

    // Keep the derived held-ticker lists in lockstep.
    if let Some(player) = record.player_mut(&trade.from_player) {
        player.picked.retain(|t| t != &trade.offer_ticker);
        player.picked.push(trade.request_ticker.clone());
    }
    if let Some(player) = record.player_mut(&trade.to_player) {
        player.picked.retain(|t| t != &trade.request_ticker);
        player.picked.push(trade.offer_ticker.clone());
    }

    set_status(record, trade_id, TradeStatus::Accepted);
    info!(
        "trade {} accepted: {} -> {}, {} -> {}",
        trade_id, trade.offer_ticker, trade.to_player, trade.request_ticker, trade.from_player
    );
    Ok(())
}

fn set_status(record: &mut GameRecord, trade_id: u64, status: TradeStatus) {
    if let Some(t) = record.trades.iter_mut().find(|t| t.id == trade_id) {
        t.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Pick, Player, TRADE_QUOTA};
    use chrono::Utc;

    fn record() -> GameRecord {
        let mut record = GameRecord::default();
        record.phase = Phase::Done;
        for (player, ticker) in [("alice", "X"), ("bob", "Y")] {
            record.players.push(Player {
                name: player.to_string(),
                max_picks: 1,
                picked: vec![ticker.to_string()],
            });
            record.picks.entry(player.to_string()).or_default().push(Pick {
                ticker: ticker.to_string(),
                price: 100.0,
                time: Utc::now(),
            });
            record.trade_limits.insert(player.to_string(), TRADE_QUOTA);
        }
        record
    }

    #[test]
    fn test_propose_assigns_sequential_ids_and_spends_quota() {
        let mut r = record();
        assert_eq!(propose(&mut r, "alice", "bob", "X", "Y").unwrap(), 1);
        assert_eq!(propose(&mut r, "alice", "bob", "X", "Y").unwrap(), 2);
        assert_eq!(r.trade_limits["alice"], TRADE_QUOTA - 2);
        assert_eq!(r.trade_limits["bob"], TRADE_QUOTA);
    }

    #[test]
    fn test_propose_rejects_self_trade_and_exhausted_quota() {
        let mut r = record();
        assert!(matches!(
            propose(&mut r, "alice", "alice", "X", "Y"),
            Err(GameError::InvalidTrade(_))
        ));
        r.trade_limits.insert("alice".to_string(), 0);
        assert!(matches!(
            propose(&mut r, "alice", "bob", "X", "Y"),
            Err(GameError::InvalidTrade(_))
        ));
    }

    #[test]
    fn test_propose_requires_done_phase() {
        let mut r = record();
        r.phase = Phase::Draft;
        assert!(matches!(
            propose(&mut r, "alice", "bob", "X", "Y"),
            Err(GameError::WrongPhase { .. })
        ));
    }

    #[test]
    fn test_accept_swaps_atomically() {
        let mut r = record();
        let id = propose(&mut r, "alice", "bob", "X", "Y").unwrap();
        respond(&mut r, id, true).unwrap();

        let alice: Vec<&str> = r.picks["alice"].iter().map(|p| p.ticker.as_str()).collect();
        let bob: Vec<&str> = r.picks["bob"].iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(alice, vec!["Y"]);
        assert_eq!(bob, vec!["X"]);
        assert_eq!(r.players[0].picked, vec!["Y".to_string()]);
        assert_eq!(r.players[1].picked, vec!["X".to_string()]);
        assert_eq!(r.picks["alice"].len() + r.picks["bob"].len(), 2);
        assert_eq!(r.trades[0].status, TradeStatus::Accepted);
    }

    #[test]
    fn test_reject_moves_nothing() {
        let mut r = record();
        let id = propose(&mut r, "alice", "bob", "X", "Y").unwrap();
        respond(&mut r, id, false).unwrap();
        assert_eq!(r.trades[0].status, TradeStatus::Rejected);
        assert_eq!(r.picks["alice"][0].ticker, "X");
        assert_eq!(r.picks["bob"][0].ticker, "Y");
    }

    #[test]
    fn test_respond_unknown_id_is_noop() {
        let mut r = record();
        respond(&mut r, 99, true).unwrap();
        assert!(r.trades.is_empty());
    }

    #[test]
    fn test_settled_trade_cannot_be_reopened() {
        let mut r = record();
        let id = propose(&mut r, "alice", "bob", "X", "Y").unwrap();
        respond(&mut r, id, false).unwrap();
        // Second response to the same id is ignored.
        respond(&mut r, id, true).unwrap();
        assert_eq!(r.trades[0].status, TradeStatus::Rejected);
        assert_eq!(r.picks["alice"][0].ticker, "X");
    }

    #[test]
    fn test_accept_missing_pick_is_invariant_violation() {
        let mut r = record();
        let id = propose(&mut r, "alice", "bob", "X", "Z").unwrap();
        let err = respond(&mut r, id, true).unwrap_err();
        assert!(matches!(err, GameError::TradeInvariantViolation { .. }));
        // Nothing moved.
        assert_eq!(r.picks["alice"][0].ticker, "X");
        assert_eq!(r.picks["bob"][0].ticker, "Y");
        assert_eq!(r.trades[0].status, TradeStatus::Pending);
    }
}
