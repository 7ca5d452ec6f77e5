use crate::errors::{GpError, Result};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2, Zip};

/// Computes differences `x1[i] - x2[j]` as a (n1, n2) matrix
pub fn pairwise_differences(
    x1: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    x2: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> Array2<f64> {
    let mut d = Array2::zeros((x1.len(), x2.len()));
    Zip::from(d.rows_mut()).and(x1).for_each(|mut row, &a| {
        Zip::from(&mut row).and(x2).for_each(|v, &b| *v = a - b);
    });
    d
}

/// Outer product `a b^T`
pub(crate) fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let col = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    col.dot(&row)
}

/// Logistic function
pub(crate) fn sigmoid(v: f64) -> f64 {
    if v >= 0. {
        1. / (1. + (-v).exp())
    } else {
        let e = v.exp();
        e / (1. + e)
    }
}

/// Returns the single input column of `x`, checking that inputs are one-dimensional and finite
pub(crate) fn single_column(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<ArrayView1<f64>> {
    if x.ncols() != 1 {
        return Err(GpError::InvalidValueError(format!(
            "Kernel expressions handle one input dimension, got {}",
            x.ncols()
        )));
    }
    let col = x.column(0);
    if col.iter().any(|v| !v.is_finite()) {
        return Err(GpError::InvalidValueError(
            "Inputs should be finite".to_string(),
        ));
    }
    Ok(col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pairwise_differences() {
        let d = pairwise_differences(&array![1., 3.], &array![0., 2., 5.]);
        assert_abs_diff_eq!(d, array![[1., -1., -4.], [3., 1., -2.]]);
    }

    #[test]
    fn test_outer() {
        let o = outer(&array![1., 2.], &array![3., 4., 5.]);
        assert_abs_diff_eq!(o, array![[3., 4., 5.], [6., 8., 10.]]);
    }

    #[test]
    fn test_sigmoid() {
        assert_abs_diff_eq!(sigmoid(0.), 0.5);
        assert_abs_diff_eq!(sigmoid(800.), 1.);
        assert_abs_diff_eq!(sigmoid(-800.), 0.);
        assert_abs_diff_eq!(sigmoid(2.) + sigmoid(-2.), 1., epsilon = 1e-15);
    }

    #[test]
    fn test_single_column() {
        let x = array![[1.], [2.]];
        assert_abs_diff_eq!(single_column(&x).unwrap(), array![1., 2.]);
        assert!(single_column(&array![[1., 2.]]).is_err());
        assert!(single_column(&array![[f64::NAN]]).is_err());
    }
}
