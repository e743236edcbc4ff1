//! Version history.
//!
//! Entry `i` of the history describes version `i + 1`. Undo and redo pick
//! their target by scanning backward:
//!
//! ```text
//!   Edit  Edit  Undo  Redo  Undo        undo target: v1
//!    v1    v2    v3    v4    v5         redo target: v5
//! ```
//!
//! An undo reverts the newest edit or redo not already cancelled by a later
//! undo. A redo reverts the newest undo not already cancelled by a later
//! redo, and only while no edit has been committed since. Omitted
//! transactions cannot be undone and nothing before them can be either.

use std::fmt;

use strata_common::types::Version;

/// What a committed version did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// A regular transaction.
    Edit,
    /// Reverted an earlier edit or redo.
    Undo,
    /// Reverted an earlier undo.
    Redo,
    /// A transaction excluded from undo, such as a bulk load.
    Omit,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Edit => write!(f, "Edit"),
            TransactionKind::Undo => write!(f, "Undo"),
            TransactionKind::Redo => write!(f, "Redo"),
            TransactionKind::Omit => write!(f, "Omit"),
        }
    }
}

fn version_of(index: usize) -> Version {
    Version::new(index as u64 + 1)
}

/// Version an undo would revert, if any.
pub fn undo_target(history: &[TransactionKind]) -> Option<Version> {
    let mut skip = 0usize;
    for (index, kind) in history.iter().enumerate().rev() {
        match kind {
            TransactionKind::Undo => skip += 1,
            TransactionKind::Edit | TransactionKind::Redo => {
                if skip == 0 {
                    return Some(version_of(index));
                }
                skip -= 1;
            }
            TransactionKind::Omit => return None,
        }
    }
    None
}

/// Version a redo would revert, if any.
pub fn redo_target(history: &[TransactionKind]) -> Option<Version> {
    let mut skip = 0usize;
    for (index, kind) in history.iter().enumerate().rev() {
        match kind {
            TransactionKind::Redo => skip += 1,
            TransactionKind::Undo => {
                if skip == 0 {
                    return Some(version_of(index));
                }
                skip -= 1;
            }
            TransactionKind::Edit | TransactionKind::Omit => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionKind::*;

    fn v(n: u64) -> Option<Version> {
        Some(Version::new(n))
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(undo_target(&[]), None);
        assert_eq!(redo_target(&[]), None);
    }

    #[test]
    fn test_undo_walks_back() {
        assert_eq!(undo_target(&[Edit, Edit]), v(2));
        assert_eq!(undo_target(&[Edit, Edit, Undo]), v(1));
        assert_eq!(undo_target(&[Edit, Edit, Undo, Undo]), None);
    }

    #[test]
    fn test_redo_matches_undos() {
        assert_eq!(redo_target(&[Edit]), None);
        assert_eq!(redo_target(&[Edit, Edit, Undo, Undo]), v(4));
        assert_eq!(redo_target(&[Edit, Edit, Undo, Undo, Redo]), v(3));
        assert_eq!(redo_target(&[Edit, Edit, Undo, Undo, Redo, Redo]), None);
    }

    #[test]
    fn test_redo_is_undoable() {
        // v4 redid v2, so undo reverts v4.
        assert_eq!(undo_target(&[Edit, Edit, Undo, Redo]), v(4));
        assert_eq!(undo_target(&[Edit, Edit, Undo, Redo, Undo]), v(1));
    }

    #[test]
    fn test_edit_clears_redo() {
        assert_eq!(redo_target(&[Edit, Undo, Edit]), None);
        assert_eq!(undo_target(&[Edit, Undo, Edit]), v(3));
    }

    #[test]
    fn test_omit_is_a_barrier() {
        assert_eq!(undo_target(&[Edit, Omit]), None);
        assert_eq!(undo_target(&[Edit, Omit, Edit]), v(3));
        assert_eq!(undo_target(&[Edit, Omit, Edit, Undo]), None);
        assert_eq!(redo_target(&[Edit, Undo, Omit]), None);
    }
}
