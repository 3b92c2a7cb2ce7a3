//! Property tests for Kanban board ordering.

use std::collections::HashMap;

use desk_engine::{Board, Card, RANK_GAP};
use desk_state::TaskStatus;
use proptest::prelude::*;
use uuid::Uuid;

fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::board_order().to_vec())
}

proptest! {
    /// Any sequence of moves keeps every card on the board exactly once and
    /// keeps ranks strictly increasing within each column.
    #[test]
    fn moves_preserve_cards_and_order(
        initial in prop::collection::vec(status_strategy(), 1..12),
        moves in prop::collection::vec((any::<prop::sample::Index>(), status_strategy(), 0usize..15), 0..40),
    ) {
        let cards: Vec<Card> = initial
            .iter()
            .enumerate()
            .map(|(i, s)| Card { task_id: Uuid::new_v4(), status: *s, rank: (i as i64 + 1) * RANK_GAP })
            .collect();
        let ids: Vec<Uuid> = cards.iter().map(|c| c.task_id).collect();
        let mut board = Board::build(cards, &HashMap::new());

        for (pick, to, index) in moves {
            let id = ids[pick.index(ids.len())];
            let out = board.move_card(id, to, index).unwrap();
            let col = board.column(to).unwrap();
            prop_assert!(col.cards.iter().any(|c| c.task_id == id && c.rank == out.rank));
        }

        let total: usize = board.columns.iter().map(|c| c.cards.len()).sum();
        prop_assert_eq!(total, ids.len());
        for col in &board.columns {
            for pair in col.cards.windows(2) {
                prop_assert!(pair[0].rank < pair[1].rank);
            }
            for card in &col.cards {
                prop_assert_eq!(card.status, col.status);
            }
        }
    }

    /// Adjacent midpoint insertions at the head of a column eventually force a
    /// renumber, after which ranks are evenly spaced again.
    #[test]
    fn repeated_head_insertions_stay_ordered(n in 1usize..30) {
        let cards: Vec<Card> = (0..=n)
            .map(|_| Card { task_id: Uuid::new_v4(), status: TaskStatus::Backlog, rank: RANK_GAP })
            .collect();
        let ids: Vec<Uuid> = cards.iter().map(|c| c.task_id).collect();
        let mut board = Board::build(cards, &HashMap::new());
        for id in &ids {
            board.move_card(*id, TaskStatus::Todo, 0).unwrap();
        }
        let col = board.column(TaskStatus::Todo).unwrap();
        prop_assert_eq!(col.cards.len(), ids.len());
        for pair in col.cards.windows(2) {
            prop_assert!(pair[0].rank < pair[1].rank);
        }
    }
}
