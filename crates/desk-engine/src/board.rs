//! # Kanban Board
//!
//! Tasks are partitioned into one column per [`TaskStatus`] and ordered
//! within a column by an integer rank. Ranks are spaced [`RANK_GAP`] apart so
//! that a drag-and-drop usually touches only the moved card: it receives the
//! midpoint of its new neighbours' ranks. When the neighbours are adjacent
//! integers the column is renumbered and every changed rank is reported so the
//! caller can persist them.
//!
//! WIP limits are enforced only when a card enters a column; reordering
//! within a full column is always allowed.

use std::collections::HashMap;

use desk_state::TaskStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BoardError;

/// Spacing between consecutive ranks after a renumber.
pub const RANK_GAP: i64 = 1024;

/// A task's position on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub status: TaskStatus,
    pub wip_limit: Option<u32>,
    pub cards: Vec<Card>,
}

impl Column {
    fn is_full(&self) -> bool {
        self.wip_limit
            .is_some_and(|limit| self.cards.len() >= limit as usize)
    }
}

/// A rank assignment to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChange {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub rank: i64,
}

/// Result of [`Board::move_card`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub task_id: Uuid,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub rank: i64,
    /// Every card whose status or rank changed, the moved card included.
    pub changes: Vec<RankChange>,
    pub rebalanced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
}

impl Board {
    /// Partition `cards` into columns in board order, sorted by rank.
    /// Ties are broken by task id so the layout is deterministic.
    pub fn build(cards: impl IntoIterator<Item = Card>, wip_limits: &HashMap<TaskStatus, u32>) -> Self {
        let mut columns: Vec<Column> = TaskStatus::board_order()
            .into_iter()
            .map(|status| Column {
                status,
                wip_limit: wip_limits.get(&status).copied(),
                cards: Vec::new(),
            })
            .collect();
        for card in cards {
            if let Some(col) = columns.iter_mut().find(|c| c.status == card.status) {
                col.cards.push(card);
            }
        }
        for col in &mut columns {
            col.cards.sort_by_key(|c| (c.rank, c.task_id));
        }
        Self { columns }
    }

    pub fn column(&self, status: TaskStatus) -> Option<&Column> {
        self.columns.iter().find(|c| c.status == status)
    }

    fn column_index(&self, status: TaskStatus) -> usize {
        // build() always creates every column.
        self.columns
            .iter()
            .position(|c| c.status == status)
            .unwrap_or_default()
    }

    fn locate(&self, task_id: Uuid) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, col)| {
            col.cards
                .iter()
                .position(|c| c.task_id == task_id)
                .map(|pos| (ci, pos))
        })
    }

    /// Rank a card would receive at the end of `status`.
    pub fn next_rank(&self, status: TaskStatus) -> i64 {
        self.column(status)
            .and_then(|c| c.cards.last())
            .map_or(RANK_GAP, |c| c.rank + RANK_GAP)
    }

    /// Move a card to position `index` of the `to` column.
    ///
    /// `index` is clamped to the column length. On error the board is
    /// unchanged.
    pub fn move_card(&mut self, task_id: Uuid, to: TaskStatus, index: usize) -> Result<MoveOutcome, BoardError> {
        let (src, pos) = self.locate(task_id).ok_or(BoardError::CardNotFound(task_id))?;
        let from = self.columns[src].status;
        let dst = self.column_index(to);
        if from != to && self.columns[dst].is_full() {
            return Err(BoardError::WipLimitExceeded {
                status: to,
                limit: self.columns[dst].wip_limit.unwrap_or_default(),
            });
        }

        let mut card = self.columns[src].cards.remove(pos);
        card.status = to;
        let cards = &mut self.columns[dst].cards;
        let index = index.min(cards.len());
        let prev = index.checked_sub(1).map(|i| cards[i].rank);
        let next = cards.get(index).map(|c| c.rank);

        match midpoint(prev, next) {
            Some(rank) => {
                card.rank = rank;
                cards.insert(index, card);
                Ok(MoveOutcome {
                    task_id,
                    from,
                    to,
                    rank,
                    changes: vec![RankChange { task_id, status: to, rank }],
                    rebalanced: false,
                })
            }
            None => {
                cards.insert(index, card);
                let mut changes = Vec::new();
                for (i, c) in cards.iter_mut().enumerate() {
                    let rank = (i as i64 + 1) * RANK_GAP;
                    if c.rank != rank || c.task_id == task_id {
                        c.rank = rank;
                        changes.push(RankChange {
                            task_id: c.task_id,
                            status: to,
                            rank,
                        });
                    }
                }
                Ok(MoveOutcome {
                    task_id,
                    from,
                    to,
                    rank: (index as i64 + 1) * RANK_GAP,
                    changes,
                    rebalanced: true,
                })
            }
        }
    }
}

/// Rank strictly between the neighbours, or `None` when there is no room.
/// A missing left neighbour behaves as rank 0.
fn midpoint(prev: Option<i64>, next: Option<i64>) -> Option<i64> {
    match (prev, next) {
        (None, None) => Some(RANK_GAP),
        (Some(p), None) => p.checked_add(RANK_GAP),
        (p, Some(n)) => {
            let p = p.unwrap_or(0);
            (n - p >= 2).then(|| p + (n - p) / 2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(status: TaskStatus, rank: i64) -> Card {
        Card {
            task_id: Uuid::new_v4(),
            status,
            rank,
        }
    }

    fn ids(board: &Board, status: TaskStatus) -> Vec<Uuid> {
        board.column(status).unwrap().cards.iter().map(|c| c.task_id).collect()
    }

    #[test]
    fn build_partitions_and_sorts() {
        let a = card(TaskStatus::Todo, 2048);
        let b = card(TaskStatus::Todo, 1024);
        let c = card(TaskStatus::Done, 1024);
        let board = Board::build([a, b, c], &HashMap::new());
        assert_eq!(board.columns.len(), 6);
        assert_eq!(board.columns[0].status, TaskStatus::Backlog);
        assert_eq!(ids(&board, TaskStatus::Todo), vec![b.task_id, a.task_id]);
        assert_eq!(ids(&board, TaskStatus::Done), vec![c.task_id]);
    }

    #[test]
    fn move_between_neighbours_takes_midpoint() {
        let a = card(TaskStatus::Todo, 1024);
        let b = card(TaskStatus::Todo, 2048);
        let m = card(TaskStatus::Backlog, 1024);
        let mut board = Board::build([a, b, m], &HashMap::new());

        let out = board.move_card(m.task_id, TaskStatus::Todo, 1).unwrap();
        assert_eq!(out.rank, 1536);
        assert_eq!(out.from, TaskStatus::Backlog);
        assert!(!out.rebalanced);
        assert_eq!(out.changes.len(), 1);
        assert_eq!(ids(&board, TaskStatus::Todo), vec![a.task_id, m.task_id, b.task_id]);
        assert!(board.column(TaskStatus::Backlog).unwrap().cards.is_empty());
    }

    #[test]
    fn move_to_end_and_empty_column() {
        let a = card(TaskStatus::Todo, 1024);
        let m = card(TaskStatus::Todo, 2048);
        let mut board = Board::build([a, m], &HashMap::new());

        let out = board.move_card(m.task_id, TaskStatus::InProgress, 99).unwrap();
        assert_eq!(out.rank, RANK_GAP);

        let out = board.move_card(a.task_id, TaskStatus::InProgress, 99).unwrap();
        assert_eq!(out.rank, 2 * RANK_GAP);
    }

    #[test]
    fn no_gap_triggers_rebalance() {
        let a = card(TaskStatus::Todo, 10);
        let b = card(TaskStatus::Todo, 11);
        let m = card(TaskStatus::Backlog, 1024);
        let mut board = Board::build([a, b, m], &HashMap::new());

        let out = board.move_card(m.task_id, TaskStatus::Todo, 1).unwrap();
        assert!(out.rebalanced);
        assert_eq!(out.rank, 2 * RANK_GAP);
        let ranks: Vec<i64> = board.column(TaskStatus::Todo).unwrap().cards.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1024, 2048, 3072]);
        assert_eq!(out.changes.len(), 3);
    }

    #[test]
    fn wip_limit_blocks_entry_but_not_reorder() {
        let a = card(TaskStatus::InProgress, 1024);
        let b = card(TaskStatus::InProgress, 2048);
        let m = card(TaskStatus::Todo, 1024);
        let limits = HashMap::from([(TaskStatus::InProgress, 2)]);
        let mut board = Board::build([a, b, m], &limits);

        let err = board.move_card(m.task_id, TaskStatus::InProgress, 0).unwrap_err();
        assert_eq!(
            err,
            BoardError::WipLimitExceeded {
                status: TaskStatus::InProgress,
                limit: 2
            }
        );
        assert_eq!(ids(&board, TaskStatus::Todo), vec![m.task_id]);

        let out = board.move_card(b.task_id, TaskStatus::InProgress, 0).unwrap();
        assert_eq!(out.rank, 512);
        assert_eq!(ids(&board, TaskStatus::InProgress), vec![b.task_id, a.task_id]);
    }

    #[test]
    fn unknown_card() {
        let mut board = Board::build(Vec::new(), &HashMap::new());
        assert!(matches!(
            board.move_card(Uuid::new_v4(), TaskStatus::Done, 0),
            Err(BoardError::CardNotFound(_))
        ));
    }

    #[test]
    fn next_rank_follows_last_card() {
        let board = Board::build([card(TaskStatus::Todo, 4096)], &HashMap::new());
        assert_eq!(board.next_rank(TaskStatus::Todo), 4096 + RANK_GAP);
        assert_eq!(board.next_rank(TaskStatus::Done), RANK_GAP);
    }
}
