//! Net-effect tracking of directory entry relocations.

use rt11_types::status;
use serde::Serialize;

/// A (segment, index) position within the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryPos {
    /// 1-based segment number.
    pub segment: u16,
    /// 0-based entry index within the segment.
    pub index: usize,
}

/// One net source-to-destination relocation of a live file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryMove {
    pub from: EntryPos,
    pub to: EntryPos,
}

#[derive(Debug)]
struct MoveRecord {
    origin: EntryPos,
    current: EntryPos,
    transaction: u64,
}

/// Collapses chains of entry moves across a sequence of transactions into
/// net source-to-destination moves.
///
/// Only file entries (tentative or permanent) are tracked; free space and
/// end-of-segment markers relocate without consequence for open handles.
///
/// A single transaction covers one physical batch — for example a block
/// shift logging N consecutive one-slot moves. Chaining across records only
/// applies between *different* transactions; without that guard the
/// one-slot moves of a shift would cascade-collapse into nonsense.
#[derive(Debug, Default)]
pub struct DirChangeTracker {
    transaction: u64,
    in_transaction: bool,
    records: Vec<MoveRecord>,
}

impl DirChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a transaction. Transactions cannot nest.
    pub fn begin_transaction(&mut self) {
        debug_assert!(!self.in_transaction);
        self.transaction += 1;
        self.in_transaction = true;
    }

    /// Record that the entry with `status` moved from `from` to `to`.
    pub fn move_dir_entry(&mut self, entry_status: u16, from: EntryPos, to: EntryPos) {
        debug_assert!(self.in_transaction);

        if entry_status & (status::TENTATIVE | status::PERMANENT) == 0 {
            return;
        }

        let transaction = self.transaction;
        match self
            .records
            .iter_mut()
            .find(|r| r.current == from && r.transaction != transaction)
        {
            Some(record) => {
                record.current = to;
                record.transaction = transaction;
            }
            None => self.records.push(MoveRecord {
                origin: from,
                current: to,
                transaction,
            }),
        }
    }

    /// Finish a transaction, dropping entries that moved back to where they
    /// started.
    pub fn end_transaction(&mut self) {
        debug_assert!(self.in_transaction);
        self.in_transaction = false;
        self.records.retain(|r| r.origin != r.current);
    }

    /// The net moves recorded so far.
    #[must_use]
    pub fn moves(&self) -> Vec<EntryMove> {
        self.records
            .iter()
            .map(|r| EntryMove {
                from: r.origin,
                to: r.current,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(segment: u16, index: usize) -> EntryPos {
        EntryPos { segment, index }
    }

    #[test]
    fn records_file_moves_only() {
        let mut tracker = DirChangeTracker::new();
        tracker.begin_transaction();
        tracker.move_dir_entry(status::PERMANENT, pos(1, 1), pos(1, 2));
        tracker.move_dir_entry(status::EMPTY, pos(1, 3), pos(1, 4));
        tracker.move_dir_entry(status::END_OF_SEGMENT, pos(1, 5), pos(1, 6));
        tracker.end_transaction();

        assert_eq!(
            tracker.moves(),
            vec![EntryMove {
                from: pos(1, 1),
                to: pos(1, 2)
            }]
        );
    }

    #[test]
    fn chains_collapse_across_transactions() {
        let mut tracker = DirChangeTracker::new();
        tracker.begin_transaction();
        tracker.move_dir_entry(status::PERMANENT, pos(1, 1), pos(1, 3));
        tracker.end_transaction();

        tracker.begin_transaction();
        tracker.move_dir_entry(status::PERMANENT, pos(1, 3), pos(1, 2));
        tracker.end_transaction();

        assert_eq!(
            tracker.moves(),
            vec![EntryMove {
                from: pos(1, 1),
                to: pos(1, 2)
            }]
        );
    }

    #[test]
    fn consecutive_shift_moves_do_not_cascade_within_one_transaction() {
        // a block shift right logs N one-slot moves; each must stay distinct
        let mut tracker = DirChangeTracker::new();
        tracker.begin_transaction();
        tracker.move_dir_entry(status::PERMANENT, pos(1, 1), pos(1, 2));
        tracker.move_dir_entry(status::PERMANENT, pos(1, 2), pos(1, 3));
        tracker.move_dir_entry(status::PERMANENT, pos(1, 3), pos(1, 4));
        tracker.end_transaction();

        assert_eq!(
            tracker.moves(),
            vec![
                EntryMove {
                    from: pos(1, 1),
                    to: pos(1, 2)
                },
                EntryMove {
                    from: pos(1, 2),
                    to: pos(1, 3)
                },
                EntryMove {
                    from: pos(1, 3),
                    to: pos(1, 4)
                },
            ]
        );
    }

    #[test]
    fn round_trip_moves_are_dropped() {
        let mut tracker = DirChangeTracker::new();
        tracker.begin_transaction();
        tracker.move_dir_entry(status::TENTATIVE, pos(1, 1), pos(2, 0));
        tracker.end_transaction();

        tracker.begin_transaction();
        tracker.move_dir_entry(status::TENTATIVE, pos(2, 0), pos(1, 1));
        tracker.end_transaction();

        assert!(tracker.moves().is_empty());
    }
}
