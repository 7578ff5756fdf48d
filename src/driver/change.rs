// ============================================================================
// Reversible Changes
// ============================================================================
//
// Every row write made by the memory driver is recorded as a `Change`.
// Undoing the log newest-first restores the previous state, which is how a
// failed statement is rolled back and how a transaction is aborted.
//
// ============================================================================

use crate::core::Row;

#[derive(Debug, Clone)]
pub(crate) enum Change {
    InsertRow {
        table: &'static str,
        row_id: u64,
    },

    UpdateRow {
        table: &'static str,
        row_id: u64,
        old_row: Row,
    },

    DeleteRow {
        table: &'static str,
        row_id: u64,
        old_row: Row,
    },
}

impl Change {
    pub(crate) fn table_name(&self) -> &'static str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::UpdateRow { table, .. } => table,
            Change::DeleteRow { table, .. } => table,
        }
    }
}

/// Ordered change log of a statement or transaction.
#[derive(Debug, Default)]
pub(crate) struct ChangeLog {
    changes: Vec<Change>,
}

impl ChangeLog {
    pub(crate) fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Removes and returns the changes recorded after `mark`, newest first.
    pub(crate) fn drain_since(&mut self, mark: usize) -> Vec<Change> {
        let mut tail = self.changes.split_off(mark.min(self.changes.len()));
        tail.reverse();
        tail
    }

    pub(crate) fn append(&mut self, other: ChangeLog) {
        self.changes.extend(other.changes);
    }
}
