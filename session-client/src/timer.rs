//! Client-side half of timer authority (§4.2.3). The server owns
//! `turn_start_epoch`; everything here is pure arithmetic over the
//! `TimerStateWire` values it sends, with no I/O of its own, so it is
//! exercised directly by unit tests rather than through a live socket.

use protocol::messages::TimerStateWire;

/// Adopts a server-stamped timer anchor at the local time the message
/// carrying it was received, per §4.2.3: `already_elapsed = T_recv -
/// turn_start_epoch_server`, then `turn_start_epoch_local = T_recv -
/// already_elapsed`. Algebraically this always lands back on
/// `turn_start_epoch_server` — the point is that the client's visible
/// countdown is then computed against its own local clock reading `now`
/// taken in the same call as `T_recv`, so the two cancel and only one-way
/// network delay between send and receipt remains as drift.
///
/// A `None` anchor (the room is paused) passes through unchanged — there
/// is no epoch to rebase.
pub fn adopt_server_anchor(server_timer: TimerStateWire, local_recv_time: f64) -> TimerStateWire {
    match server_timer.turn_start_epoch {
        Some(server_epoch) => {
            let already_elapsed = local_recv_time - server_epoch;
            TimerStateWire {
                turn_start_epoch: Some(local_recv_time - already_elapsed),
                ..server_timer
            }
        }
        None => server_timer,
    }
}

/// Rebases a peer's timer after a `player_resume` (§4.2.3): the receiver
/// sets `elapsed_before_pause = move_time_limit - remaining_turn` and
/// starts a fresh anchor at `now`.
pub fn rebase_on_resume(move_time_limit: f64, remaining_turn: f64, now: f64) -> TimerStateWire {
    TimerStateWire {
        turn_start_epoch: Some(now),
        elapsed_before_pause: move_time_limit - remaining_turn,
        move_time_limit,
    }
}

/// Effective elapsed time against a timer anchor (§3 Data Model): unpaused,
/// `elapsed_before_pause + (now - turn_start_epoch)`; paused (no anchor),
/// exactly `elapsed_before_pause`.
pub fn effective_elapsed(anchor: TimerStateWire, now: f64) -> f64 {
    match anchor.turn_start_epoch {
        Some(epoch) => anchor.elapsed_before_pause + (now - epoch),
        None => anchor.elapsed_before_pause,
    }
}

/// Seconds remaining on the move timer, clamped to zero. What a client UI
/// actually renders as the countdown.
pub fn remaining(anchor: TimerStateWire, now: f64) -> f64 {
    (anchor.move_time_limit - effective_elapsed(anchor, now)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(turn_start_epoch: Option<f64>, elapsed_before_pause: f64, move_time_limit: f64) -> TimerStateWire {
        TimerStateWire {
            turn_start_epoch,
            elapsed_before_pause,
            move_time_limit,
        }
    }

    #[test]
    fn adopting_the_anchor_reproduces_the_server_epoch() {
        let server = wire(Some(1_000.0), 0.0, 30.0);
        let local = adopt_server_anchor(server, 1_000.4);
        assert_eq!(local.turn_start_epoch, Some(1_000.0));
        assert_eq!(local.elapsed_before_pause, 0.0);
        assert_eq!(local.move_time_limit, 30.0);
    }

    #[test]
    fn a_paused_anchor_is_untouched_by_adoption() {
        let server = wire(None, 7.5, 30.0);
        let local = adopt_server_anchor(server, 1_234.0);
        assert_eq!(local.turn_start_epoch, None);
        assert_eq!(local.elapsed_before_pause, 7.5);
    }

    #[test]
    fn resume_rebases_from_the_remaining_turn_budget() {
        // Scenario 3 from §8: 30s limit, resumed with 22.5s remaining.
        let rebased = rebase_on_resume(30.0, 22.5, 2_000.0);
        assert_eq!(rebased.turn_start_epoch, Some(2_000.0));
        assert_eq!(rebased.elapsed_before_pause, 7.5);
        assert_eq!(remaining(rebased, 2_000.0), 22.5);
    }

    #[test]
    fn remaining_counts_down_and_never_goes_negative() {
        let anchor = wire(Some(0.0), 0.0, 30.0);
        assert_eq!(remaining(anchor, 10.0), 20.0);
        assert_eq!(remaining(anchor, 45.0), 0.0);
    }

    #[test]
    fn effective_elapsed_while_paused_ignores_wall_clock() {
        let anchor = wire(None, 12.0, 30.0);
        assert_eq!(effective_elapsed(anchor, 999_999.0), 12.0);
    }
}
