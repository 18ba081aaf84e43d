use crate::traits::RowOps;
pub use nalgebra::{DMatrix, DVector};

impl RowOps for DMatrix<f64> {
    type Mat = DMatrix<f64>;

    fn normalize_rows_inplace(&mut self) {
        for mut row in self.row_iter_mut() {
            let denom = row.norm();
            if denom > 0.0 {
                row /= denom;
            }
        }
    }

    fn row_argmax(&self) -> Vec<usize> {
        self.row_iter()
            .map(|row| {
                let mut best = 0;
                for (j, &x) in row.iter().enumerate() {
                    if x > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }

    fn concatenate_horizontal(&self, other: &Self::Mat) -> anyhow::Result<Self::Mat> {
        if self.nrows() != other.nrows() {
            return Err(anyhow::anyhow!(
                "row numbers don't match: {} vs {}",
                self.nrows(),
                other.nrows()
            ));
        }
        let ncols = self.ncols() + other.ncols();
        let nself = self.ncols();
        Ok(DMatrix::from_fn(self.nrows(), ncols, |i, j| {
            if j < nself {
                self[(i, j)]
            } else {
                other[(i, j - nself)]
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalize_rows_keeps_zero_rows() {
        let mut m = DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 0.0, 0.0]);
        m.normalize_rows_inplace();
        assert_abs_diff_eq!(m[(0, 0)], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(m[(0, 1)], 0.8, epsilon = 1e-12);
        assert_eq!(m[(1, 0)], 0.0);
    }

    #[test]
    fn test_row_argmax_first_on_ties() {
        let m = DMatrix::from_row_slice(2, 3, &[0.2, 0.5, 0.3, 0.4, 0.4, 0.2]);
        assert_eq!(m.row_argmax(), vec![1, 0]);
    }

    #[test]
    fn test_concatenate_horizontal() {
        let a = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        let b = DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 5.0, 6.0]);
        let c = a.concatenate_horizontal(&b).unwrap();
        assert_eq!(c.ncols(), 3);
        assert_eq!(c[(1, 0)], 2.0);
        assert_eq!(c[(1, 2)], 6.0);
        assert!(a.concatenate_horizontal(&DMatrix::zeros(3, 1)).is_err());
    }
}
