//! Row-level change enumeration.

use strata_common::types::RowId;

/// How a row differs between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Absent or deleted before, live after.
    Inserted,
    /// Live before, absent or deleted after.
    Deleted,
    /// Live on both sides with different data.
    Updated,
}

/// One changed row with its data on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange<T> {
    /// The changed row.
    pub row: RowId,
    /// Kind of change.
    pub action: ChangeAction,
    /// Data at the older version, if the row was live there.
    pub old: Option<T>,
    /// Data at the newer version, if the row is live there.
    pub new: Option<T>,
}

impl<T: PartialEq> RowChange<T> {
    /// Classifies a row from its data at two versions.
    ///
    /// Returns `None` when the row is identical on both sides or live on
    /// neither.
    pub fn classify(row: RowId, old: Option<T>, new: Option<T>) -> Option<Self> {
        let action = match (&old, &new) {
            (None, None) => return None,
            (None, Some(_)) => ChangeAction::Inserted,
            (Some(_), None) => ChangeAction::Deleted,
            (Some(a), Some(b)) if a == b => return None,
            (Some(_), Some(_)) => ChangeAction::Updated,
        };
        Some(Self {
            row,
            action,
            old,
            new,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let row = RowId::new(3);
        assert!(RowChange::<i32>::classify(row, None, None).is_none());
        assert!(RowChange::classify(row, Some(1), Some(1)).is_none());
        assert_eq!(
            RowChange::classify(row, None, Some(1)).unwrap().action,
            ChangeAction::Inserted
        );
        assert_eq!(
            RowChange::classify(row, Some(1), None).unwrap().action,
            ChangeAction::Deleted
        );
        let updated = RowChange::classify(row, Some(1), Some(2)).unwrap();
        assert_eq!(updated.action, ChangeAction::Updated);
        assert_eq!(updated.old, Some(1));
        assert_eq!(updated.new, Some(2));
    }
}
