use super::{ConversationError, Turn};
use crate::config::HistoryPolicyKind;
use tiktoken_rs::{CoreBPE, cl100k_base};

/// Decides which turns a session keeps after each new turn.
pub trait HistoryPolicy: Send + Sync {
    /// Drop turns from the front of `history` as needed. `history` is oldest first.
    fn apply(&self, history: &mut Vec<Turn>);

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Keeps every turn for the lifetime of the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl HistoryPolicy for Unbounded {
    fn apply(&self, _history: &mut Vec<Turn>) {}

    fn name(&self) -> &'static str {
        "unbounded"
    }
}

/// Keeps the newest `max_turns` turns (at least one).
#[derive(Debug, Clone, Copy)]
pub struct SlidingWindow {
    max_turns: usize,
}

impl SlidingWindow {
    /// Window holding up to `max_turns` turns.
    pub const fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }
}

impl HistoryPolicy for SlidingWindow {
    fn apply(&self, history: &mut Vec<Turn>) {
        let keep = self.max_turns.max(1);
        if history.len() > keep {
            let excess = history.len() - keep;
            history.drain(..excess);
            tracing::debug!(dropped = excess, kept = keep, "Trimmed conversation history");
        }
    }

    fn name(&self) -> &'static str {
        "window"
    }
}

/// Keeps the newest turns whose combined `cl100k_base` token count fits the budget.
///
/// The newest turn is always kept, even when it alone exceeds the budget.
pub struct TokenBudget {
    max_tokens: usize,
    encoding: CoreBPE,
}

impl TokenBudget {
    /// Budget of `max_tokens` tokens across user and assistant text.
    pub fn new(max_tokens: usize) -> Result<Self, ConversationError> {
        let encoding = cl100k_base().map_err(|source| ConversationError::Tokenizer { source })?;
        Ok(Self {
            max_tokens,
            encoding,
        })
    }

    fn turn_tokens(&self, turn: &Turn) -> usize {
        self.encoding.encode_ordinary(&turn.user).len()
            + self.encoding.encode_ordinary(&turn.assistant).len()
    }
}

impl HistoryPolicy for TokenBudget {
    fn apply(&self, history: &mut Vec<Turn>) {
        let mut total: usize = history.iter().map(|turn| self.turn_tokens(turn)).sum();
        let mut dropped = 0;
        while total > self.max_tokens && history.len() > 1 {
            let oldest = history.remove(0);
            total -= self.turn_tokens(&oldest);
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(
                dropped,
                tokens = total,
                budget = self.max_tokens,
                "Trimmed conversation history"
            );
        }
    }

    fn name(&self) -> &'static str {
        "tokens"
    }
}

/// Policy selected through `HISTORY_POLICY`.
pub fn policy_from_kind(
    kind: HistoryPolicyKind,
) -> Result<Box<dyn HistoryPolicy>, ConversationError> {
    let policy: Box<dyn HistoryPolicy> = match kind {
        HistoryPolicyKind::Unbounded => Box::new(Unbounded),
        HistoryPolicyKind::Window(max_turns) => Box::new(SlidingWindow::new(max_turns)),
        HistoryPolicyKind::Tokens(max_tokens) => Box::new(TokenBudget::new(max_tokens)?),
    };
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(count: usize) -> Vec<Turn> {
        (0..count)
            .map(|index| Turn {
                user: format!("question {index}"),
                assistant: format!("answer {index}"),
            })
            .collect()
    }

    #[test]
    fn unbounded_keeps_everything() {
        let mut history = turns(50);
        Unbounded.apply(&mut history);
        assert_eq!(history.len(), 50);
    }

    #[test]
    fn window_keeps_newest_turns() {
        let mut history = turns(5);
        SlidingWindow::new(2).apply(&mut history);
        assert_eq!(history, turns(5)[3..].to_vec());

        let mut history = turns(3);
        SlidingWindow::new(0).apply(&mut history);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user, "question 2");
    }

    #[test]
    fn token_budget_drops_oldest_until_it_fits() {
        let policy = TokenBudget::new(10).expect("encoding");
        let mut history = turns(4);
        let per_turn = policy.turn_tokens(&history[0]);
        assert!(per_turn > 0 && per_turn <= 10);

        policy.apply(&mut history);
        let total: usize = history.iter().map(|turn| policy.turn_tokens(turn)).sum();
        assert!(total <= 10);
        assert_eq!(history.last().map(|turn| turn.user.as_str()), Some("question 3"));
    }

    #[test]
    fn token_budget_keeps_an_oversized_newest_turn() {
        let policy = TokenBudget::new(1).expect("encoding");
        let mut history = vec![Turn {
            user: "a fairly long question about quarterly revenue".into(),
            assistant: "an equally long answer".into(),
        }];
        policy.apply(&mut history);
        assert_eq!(history.len(), 1);
    }
}
