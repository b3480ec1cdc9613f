use crate::models::{GameStatus, PickStatus, Side};

/// Grade a pick against a game's status and recorded winner.
///
/// Only a final game with a recorded winner settles a pick. A final game
/// without a winner (a tie) leaves every pick pending.
pub fn grade_pick(status: GameStatus, winner: Option<Side>, chosen: Side) -> PickStatus {
    match (status, winner) {
        (GameStatus::Final, Some(winner)) if winner == chosen => PickStatus::Correct,
        (GameStatus::Final, Some(_)) => PickStatus::Incorrect,
        _ => PickStatus::Pending,
    }
}
