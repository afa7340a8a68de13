//! Matrix conversion utilities.
//!
//! The fitting code keeps its vectors and matrices in ndarray; the dense
//! decompositions (Cholesky, LU, SVD) come from nalgebra. These helpers move
//! data across that boundary.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

/// Convert an ndarray Array2 to a nalgebra DMatrix.
///
/// ndarray is row-major by default and nalgebra is column-major, so the copy
/// goes element by element.
pub fn ndarray_to_nalgebra(arr: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Convert an ndarray Array1 to a nalgebra DVector.
pub fn ndarray_vec_to_nalgebra(arr: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(arr.len(), arr.iter().copied())
}

/// Convert a nalgebra DVector to an ndarray Array1.
pub fn nalgebra_vec_to_ndarray(vec: &DVector<f64>) -> Array1<f64> {
    vec.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, array};

    fn nalgebra_to_ndarray(mat: &DMatrix<f64>) -> Array2<f64> {
        Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
    }

    #[test]
    fn test_matrix_layout_is_preserved() {
        let arr = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let mat = ndarray_to_nalgebra(&arr);

        assert_eq!(mat.nrows(), 2);
        assert_eq!(mat.ncols(), 3);
        assert_eq!(mat[(0, 2)], 3.0);
        assert_eq!(mat[(1, 0)], 4.0);

        assert_eq!(nalgebra_to_ndarray(&mat), arr);
    }

    #[test]
    fn test_vector_conversion() {
        let arr = array![1.5, -2.0, 7.25];
        let vec = ndarray_vec_to_nalgebra(&arr);
        assert_eq!(vec.len(), 3);
        assert_eq!(vec[2], 7.25);
        assert_eq!(nalgebra_vec_to_ndarray(&vec), arr);
    }
}
