/// Solve `a · x = b` for a small dense system by Gauss-Jordan elimination
/// with partial pivoting on the augmented matrix.
///
/// Returns `None` when any pivot magnitude falls below `epsilon`.
pub fn solve<const N: usize>(a: [[f64; N]; N], b: [f64; N], epsilon: f64) -> Option<[f64; N]> {
    let mut aug = [[0.0; N]; N];
    let mut rhs = b;
    for (row, src) in aug.iter_mut().zip(a.iter()) {
        row.copy_from_slice(src);
    }

    for col in 0..N {
        let pivot_row = (col..N).max_by(|&i, &j| aug[i][col].abs().total_cmp(&aug[j][col].abs()))?;
        if aug[pivot_row][col].abs() < epsilon {
            return None;
        }
        aug.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        let pivot = aug[col][col];
        for k in 0..N {
            aug[col][k] /= pivot;
        }
        rhs[col] /= pivot;

        for row in 0..N {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..N {
                aug[row][k] -= factor * aug[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    rhs.iter().all(|v| v.is_finite()).then_some(rhs)
}
