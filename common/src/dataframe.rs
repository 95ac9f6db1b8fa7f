use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::{MlError, MlResult};

/// Numeric, row-major table handed to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl DataFrame {
    /// Builds a frame, checking every row has one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> MlResult<Self> {
        let frame = Self { columns, rows };
        frame.check_shape()?;
        Ok(frame)
    }

    /// Every row has one value per column. Frames decoded from the wire skip
    /// `new`, so they are checked here before use.
    pub fn check_shape(&self) -> MlResult<()> {
        match self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.columns.len())
        {
            Some((idx, row)) => Err(MlError::InvalidArgument(format!(
                "row {} has {} values but the frame has {} columns",
                idx,
                row.len(),
                self.columns.len()
            ))),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> MlResult<Vec<f64>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| MlError::InvalidArgument(format!("unknown column '{}'", name)))?;
        Ok(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Projection onto `names`, in the given order.
    pub fn select(&self, names: &[String]) -> MlResult<DataFrame> {
        let idxs = names
            .iter()
            .map(|n| {
                self.column_index(n)
                    .ok_or_else(|| MlError::InvalidArgument(format!("unknown column '{}'", n)))
            })
            .collect::<MlResult<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|r| idxs.iter().map(|&i| r[i]).collect())
            .collect();

        Ok(DataFrame {
            columns: names.to_vec(),
            rows,
        })
    }

    /// Every column except `name`.
    pub fn drop_column(&self, name: &str) -> MlResult<DataFrame> {
        let keep: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.as_str() != name)
            .cloned()
            .collect();
        if keep.len() == self.columns.len() {
            return Err(MlError::InvalidArgument(format!("unknown column '{}'", name)));
        }
        self.select(&keep)
    }

    pub fn head(mut self, n: usize) -> DataFrame {
        self.rows.truncate(n);
        self
    }

    /// Appends the rows of `other`; both frames must share the same columns.
    pub fn append(&mut self, other: DataFrame) -> MlResult<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.columns != other.columns {
            return Err(MlError::InvalidArgument(format!(
                "cannot concatenate frames with columns {:?} and {:?}",
                self.columns, other.columns
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Reads a CSV document with a header row. Every cell must be numeric.
    pub fn from_csv_reader<R: Read>(reader: R) -> MlResult<DataFrame> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(|e| MlError::InvalidArgument(format!("invalid csv header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record =
                record.map_err(|e| MlError::InvalidArgument(format!("invalid csv record: {e}")))?;
            let row = record
                .iter()
                .map(|cell| {
                    cell.parse::<f64>().map_err(|_| {
                        MlError::InvalidArgument(format!(
                            "non numeric value '{}' in csv row {}",
                            cell,
                            line + 1
                        ))
                    })
                })
                .collect::<MlResult<Vec<f64>>>()?;
            rows.push(row);
        }

        DataFrame::new(columns, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn frame() -> DataFrame {
        DataFrame::new(
            vec!["x".into(), "y".into(), "z".into()],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let res = DataFrame::new(vec!["a".into()], vec![vec![1.0, 2.0]]);
        assert_matches!(res, Err(MlError::InvalidArgument(_)));
    }

    #[test]
    fn select_reorders_columns() {
        let f = frame().select(&["z".to_string(), "x".to_string()]).unwrap();
        assert_eq!(f.columns, vec!["z", "x"]);
        assert_eq!(f.rows, vec![vec![3.0, 1.0], vec![6.0, 4.0]]);
    }

    #[test]
    fn drop_unknown_column_fails() {
        assert_matches!(frame().drop_column("nope"), Err(MlError::InvalidArgument(_)));
        assert_eq!(frame().drop_column("y").unwrap().columns, vec!["x", "z"]);
    }

    #[test]
    fn append_requires_same_columns() {
        let mut a = frame();
        a.append(frame()).unwrap();
        assert_eq!(a.len(), 4);

        let other = DataFrame::new(vec!["q".into()], vec![vec![0.0]]).unwrap();
        assert!(a.append(other).is_err());

        let mut empty = DataFrame::default();
        empty.append(frame()).unwrap();
        assert_eq!(empty.width(), 3);
    }

    #[test]
    fn parses_csv() {
        let data = "x, y\n1, 2.5\n3,4\n";
        let f = DataFrame::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(f.columns, vec!["x", "y"]);
        assert_eq!(f.column("y").unwrap(), vec![2.5, 4.0]);
    }

    #[test]
    fn csv_with_text_cell_is_invalid() {
        let data = "x,y\n1,abc\n";
        let err = DataFrame::from_csv_reader(data.as_bytes()).unwrap_err();
        assert_matches!(err, MlError::InvalidArgument(msg) if msg.contains("abc"));
    }
}
