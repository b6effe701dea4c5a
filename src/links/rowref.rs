use std::fmt;

/// Reference to one row of one table.
///
/// Ordered by table index, then row index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowRef {
    pub table_index: u32,
    pub row_index: u64,
}

impl RowRef {
    pub fn new(table_index: u32, row_index: u64) -> Self {
        Self {
            table_index,
            row_index,
        }
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_index, self.row_index)
    }
}
