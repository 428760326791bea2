//! Append-only conversation log owned by the turn driver.

use crate::models::{IncomingTurn, Turn};

/// Ordered turns sent to the model: the system turn, the client's prior
/// turns, then every assistant and tool turn produced during the run.
///
/// Turns are never removed or rewritten once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnLog {
    turns: Vec<Turn>,
    seeded: usize,
}

impl TurnLog {
    /// Start a log from the system prompt and the client-supplied history.
    /// Client turns with roles other than `user`/`assistant` are dropped.
    pub fn seed(system_prompt: &str, prior: impl IntoIterator<Item = IncomingTurn>) -> Self {
        let mut turns = vec![Turn::system(system_prompt)];
        turns.extend(prior.into_iter().filter_map(IncomingTurn::into_turn));
        let seeded = turns.len();
        Self { turns, seeded }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Full message list in request order.
    #[must_use]
    pub fn messages(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns appended since the log was seeded.
    #[must_use]
    pub fn run_turns(&self) -> &[Turn] {
        &self.turns[self.seeded..]
    }
}

#[cfg(test)]
impl TurnLog {
    /// The most recent tool turn answering `call_id`.
    pub fn tool_turn(&self, call_id: &str) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| {
                t.role == crate::models::Role::Tool && t.tool_call_id.as_deref() == Some(call_id)
            })
    }
}
