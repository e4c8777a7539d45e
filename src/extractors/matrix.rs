// src/extractors/matrix.rs
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;

/// One table cell. `None` is an empty cell; blank text never survives as
/// `Some`.
pub type Cell = Option<String>;

/// Dense, rectangular grid of optional text. Row and column positions are
/// always `0..n`; removing a row or column shifts everything after it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CellMatrix {
    rows: Vec<Vec<Cell>>,
    width: usize,
}

fn tidy(cell: Cell) -> Cell {
    cell.filter(|text| !text.trim().is_empty())
}

impl CellMatrix {
    /// Builds a matrix, padding short rows with empty cells.
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|row| {
                let mut row: Vec<Cell> = row.into_iter().map(tidy).collect();
                row.resize(width, None);
                row
            })
            .collect();
        Self { rows, width }
    }

    /// Convenience constructor; empty strings become empty cells.
    pub fn from_strs(rows: &[&[&str]]) -> Self {
        Self::new(
            rows.iter()
                .map(|row| row.iter().map(|s| Some(s.to_string())).collect())
                .collect(),
        )
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.width == 0
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row(&self, r: usize) -> &[Cell] {
        &self.rows[r]
    }

    pub fn get(&self, r: usize, c: usize) -> Option<&str> {
        self.rows.get(r)?.get(c)?.as_deref()
    }

    pub fn set(&mut self, r: usize, c: usize, value: Cell) {
        if let Some(slot) = self.rows.get_mut(r).and_then(|row| row.get_mut(c)) {
            *slot = tidy(value);
        }
    }

    pub fn column(&self, c: usize) -> Vec<Option<&str>> {
        self.rows.iter().map(|row| row[c].as_deref()).collect()
    }

    pub fn column_cells(&self, c: usize) -> Vec<Cell> {
        self.rows.iter().map(|row| row[c].clone()).collect()
    }

    /// Applies `f` to every non-empty cell. An empty result clears the cell.
    pub fn map_cells<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                if let Some(text) = cell.as_deref() {
                    *cell = tidy(f(text));
                }
            }
        }
    }

    pub fn row_is_empty(&self, r: usize) -> bool {
        self.rows[r].iter().all(Option::is_none)
    }

    pub fn column_is_empty(&self, c: usize) -> bool {
        self.rows.iter().all(|row| row[c].is_none())
    }

    /// True when every cell of row `r` from column `from` onward is empty.
    pub fn values_empty(&self, r: usize, from: usize) -> bool {
        self.rows[r].iter().skip(from).all(Option::is_none)
    }

    /// Drops fully-empty rows and columns. Returns whether anything changed.
    pub fn drop_empty(&mut self) -> bool {
        let before = (self.rows.len(), self.width);
        self.rows.retain(|row| row.iter().any(Option::is_some));
        let empty_cols: Vec<usize> = (0..self.width)
            .filter(|&c| self.column_is_empty(c))
            .collect();
        self.remove_columns(&empty_cols);
        if self.rows.is_empty() {
            self.width = 0;
        }
        before != (self.rows.len(), self.width)
    }

    pub fn remove_columns(&mut self, cols: &[usize]) {
        if cols.is_empty() {
            return;
        }
        let doomed: BTreeSet<usize> = cols.iter().copied().collect();
        for row in &mut self.rows {
            let mut c = 0;
            row.retain(|_| {
                let keep = !doomed.contains(&c);
                c += 1;
                keep
            });
        }
        self.width -= doomed.iter().filter(|&&c| c < self.width).count();
    }

    /// Keeps only the listed columns, in ascending position order.
    pub fn retain_columns(&mut self, keep: &[usize]) {
        let keep: BTreeSet<usize> = keep.iter().copied().collect();
        let doomed: Vec<usize> = (0..self.width).filter(|c| !keep.contains(c)).collect();
        self.remove_columns(&doomed);
    }

    pub fn remove_rows(&mut self, rows: &[usize]) {
        let doomed: BTreeSet<usize> = rows.iter().copied().collect();
        let mut r = 0;
        self.rows.retain(|_| {
            let keep = !doomed.contains(&r);
            r += 1;
            keep
        });
    }

    pub fn truncate_rows(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    pub fn insert_row(&mut self, at: usize, row: Vec<Cell>) {
        let mut row: Vec<Cell> = row.into_iter().map(tidy).collect();
        row.resize(self.width, None);
        self.rows.insert(at, row);
    }

    /// Copies a contiguous block of rows into a new matrix of the same width.
    pub fn slice_rows(&self, range: Range<usize>) -> CellMatrix {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        CellMatrix {
            rows: self.rows[start..end].to_vec(),
            width: self.width,
        }
    }

    /// Extracts one column as its own single-column matrix.
    pub fn column_matrix(&self, c: usize) -> CellMatrix {
        CellMatrix::new(self.rows.iter().map(|row| vec![row[c].clone()]).collect())
    }

    /// Appends the columns of `other` to the right; row counts are padded.
    pub fn append_columns(&mut self, other: &CellMatrix) {
        let n = self.rows.len().max(other.rows.len());
        self.rows.resize(n, vec![None; self.width]);
        for (r, row) in self.rows.iter_mut().enumerate() {
            match other.rows.get(r) {
                Some(extra) => row.extend(extra.iter().cloned()),
                None => row.extend(std::iter::repeat(None).take(other.width)),
            }
        }
        self.width += other.width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pads_rows_and_clears_blanks() {
        let m = CellMatrix::new(vec![
            vec![Some("a".into()), Some("  ".into())],
            vec![Some("b".into()), Some("c".into()), Some("d".into())],
        ]);
        assert_eq!(m.n_cols(), 3);
        assert_eq!(m.get(0, 1), None);
        assert_eq!(m.get(0, 2), None);
        assert_eq!(m.get(1, 2), Some("d"));
    }

    #[test]
    fn test_drop_empty_reindexes_densely() {
        let mut m = CellMatrix::from_strs(&[
            &["a", "", "b"],
            &["", "", ""],
            &["c", "", "d"],
        ]);
        assert!(m.drop_empty());
        assert_eq!(m, CellMatrix::from_strs(&[&["a", "b"], &["c", "d"]]));
        assert!(!m.drop_empty());
    }

    #[test]
    fn test_remove_and_retain_columns() {
        let mut m = CellMatrix::from_strs(&[&["a", "b", "c", "d"]]);
        m.remove_columns(&[1, 3]);
        assert_eq!(m, CellMatrix::from_strs(&[&["a", "c"]]));

        let mut m = CellMatrix::from_strs(&[&["a", "b", "c", "d"]]);
        m.retain_columns(&[3, 0]);
        assert_eq!(m, CellMatrix::from_strs(&[&["a", "d"]]));
    }

    #[test]
    fn test_slice_rows_clamps_range() {
        let m = CellMatrix::from_strs(&[&["a"], &["b"], &["c"]]);
        assert_eq!(m.slice_rows(1..10), CellMatrix::from_strs(&[&["b"], &["c"]]));
        assert_eq!(m.slice_rows(5..10).n_rows(), 0);
    }
}
