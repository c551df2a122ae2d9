//! Claim batch domain types

use super::row::Row;

/// A row this poller successfully claimed, paired with the store's acknowledgement
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedRow {
    /// The row as it looked when the claim was attempted
    pub row: Row,
    /// The row as the store wrote it back after the claim
    pub ack: Row,
}

/// Ordered rows claimed by one claim attempt
///
/// Transient: consumed within the poll cycle that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimBatch {
    entries: Vec<ClaimedRow>,
}

impl ClaimBatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Row, ack: Row) {
        self.entries.push(ClaimedRow { row, ack });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClaimedRow> {
        self.entries.iter()
    }
}

impl From<Vec<ClaimedRow>> for ClaimBatch {
    fn from(entries: Vec<ClaimedRow>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for ClaimBatch {
    type Item = ClaimedRow;
    type IntoIter = std::vec::IntoIter<ClaimedRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClaimBatch {
    type Item = &'a ClaimedRow;
    type IntoIter = std::slice::Iter<'a, ClaimedRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
