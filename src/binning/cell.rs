use std::fmt;

/// Label of one cell of a discretised coordinate space.
///
/// Equality, hashing and ordering are element-wise over the coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell(Box<[i64]>);

impl Cell {
    pub fn new(coords: impl Into<Box<[i64]>>) -> Self {
        Cell(coords.into())
    }

    pub fn coords(&self) -> &[i64] {
        &self.0
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<i64>> for Cell {
    fn from(coords: Vec<i64>) -> Self {
        Cell(coords.into_boxed_slice())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}
