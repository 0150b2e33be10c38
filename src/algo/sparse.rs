//! Sparse matrices and the linear solvers behind reconstruction.
//!
//! Least-squares systems `A x ≈ b` are solved through the normal equations
//! `AᵀA x = Aᵀb`, either with a sparse Cholesky factorization or with
//! Jacobi-preconditioned conjugate gradient. Small systems can instead use a
//! dense QR factorization of `A` itself.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::error::SolveError;

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// Row `i` occupies `row_ptr[i]..row_ptr[i + 1]` of `col_idx`/`values`.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from (row, col, value) triplets.
    ///
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            debug_assert!(row < rows && col < cols, "triplet ({}, {}) out of bounds", row, col);
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v += val;
                }
                continue;
            }
            col_idx.push(col);
            values.push(val);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }

        // Counts to offsets.
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over the (col, value) entries of one row.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// y = A x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "vector dimension mismatch");
        DVector::from_fn(self.rows, |i, _| self.row(i).map(|(c, v)| v * x[c]).sum())
    }

    /// y = Aᵀ x.
    pub fn transpose_mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.rows, "vector dimension mismatch");
        let mut y = DVector::zeros(self.cols);
        for i in 0..self.rows {
            let xi = x[i];
            if xi == 0.0 {
                continue;
            }
            for (c, v) in self.row(i) {
                y[c] += v * xi;
            }
        }
        y
    }

    /// The Gram matrix AᵀA.
    pub fn normal_matrix(&self) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..self.rows {
            let entries: Vec<(usize, f64)> = self.row(i).collect();
            for &(c1, v1) in &entries {
                for &(c2, v2) in &entries {
                    triplets.push((c1, c2, v1 * v2));
                }
            }
        }
        CsrMatrix::from_triplets(self.cols, self.cols, triplets)
    }

    /// Main diagonal (square part).
    pub fn diagonal(&self) -> DVector<f64> {
        let n = self.rows.min(self.cols);
        DVector::from_fn(n, |i, _| {
            self.row(i).find(|&(c, _)| c == i).map_or(0.0, |(_, v)| v)
        })
    }

    /// Copy into compressed sparse column layout.
    pub fn to_csc(&self) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(self.rows, self.cols);
        for i in 0..self.rows {
            for (c, v) in self.row(i) {
                coo.push(i, c, v);
            }
        }
        CscMatrix::from(&coo)
    }

    /// Dense copy.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(self.rows, self.cols);
        for i in 0..self.rows {
            for (c, v) in self.row(i) {
                m[(i, c)] += v;
            }
        }
        m
    }
}

/// Outcome of an iterative solve.
#[derive(Debug, Clone)]
pub struct CgSolution {
    /// The solution vector.
    pub x: DVector<f64>,
    /// Iterations performed.
    pub iterations: usize,
}

/// Solve A x = b for symmetric positive definite A with Jacobi-preconditioned CG.
///
/// Converges when the relative residual `|b - Ax| / |b|` drops below
/// `tolerance`. `x0` warm-starts the iteration.
pub fn preconditioned_conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> Result<CgSolution, SolveError> {
    let n = b.len();
    assert_eq!(a.nrows(), n, "matrix-vector dimension mismatch");
    assert_eq!(a.ncols(), n, "matrix must be square");

    let mut x = match x0 {
        Some(x0) if x0.len() == n => x0.clone(),
        _ => DVector::zeros(n),
    };

    let b_norm = b.norm();
    if b_norm < 1e-300 {
        return Ok(CgSolution {
            x: DVector::zeros(n),
            iterations: 0,
        });
    }

    let inv_diag = a.diagonal().map(|d| if d.abs() > 1e-300 { 1.0 / d } else { 1.0 });

    let mut r = b - a.mul_vec(&x);
    let mut residual = r.norm() / b_norm;
    if residual < tolerance {
        return Ok(CgSolution { x, iterations: 0 });
    }

    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for iter in 1..=max_iter {
        let ap = a.mul_vec(&p);
        let p_ap = p.dot(&ap);
        if p_ap.abs() < 1e-300 {
            break;
        }
        let alpha = rz / p_ap;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        residual = r.norm() / b_norm;
        if residual < tolerance {
            return Ok(CgSolution {
                x,
                iterations: iter,
            });
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        p = &z + beta * &p;
        rz = rz_new;
    }

    if !residual.is_finite() {
        return Err(SolveError::NonFinite);
    }
    Err(SolveError::NotConverged {
        iterations: max_iter,
        residual,
    })
}

/// Least-squares solve of A X ≈ B through a sparse Cholesky factorization of AᵀA.
///
/// The factorization is computed once and shared by every right-hand side.
/// A rank-deficient `A` makes AᵀA indefinite and is reported as singular.
pub fn sparse_cholesky_least_squares(
    a: &CsrMatrix,
    rhs: &[DVector<f64>],
) -> Result<Vec<DVector<f64>>, SolveError> {
    let n = a.ncols();
    if a.nrows() < n {
        return Err(SolveError::Singular);
    }
    if n == 0 || rhs.is_empty() {
        return Ok(rhs.iter().map(|_| DVector::zeros(n)).collect());
    }

    let normal = a.normal_matrix().to_csc();
    let factor = CscCholesky::factor(&normal).map_err(|_| SolveError::Singular)?;

    let atb: Vec<DVector<f64>> = rhs.iter().map(|b| a.transpose_mul_vec(b)).collect();
    let x = factor.solve(&DMatrix::from_columns(&atb));
    Ok(x.column_iter().map(|c| c.into_owned()).collect())
}

/// Least-squares solve of A X ≈ B for several right-hand sides with dense QR.
///
/// Requires at least as many rows as columns and full column rank.
pub fn dense_least_squares(
    a: &CsrMatrix,
    rhs: &[DVector<f64>],
) -> Result<Vec<DVector<f64>>, SolveError> {
    if a.nrows() < a.ncols() {
        return Err(SolveError::Singular);
    }
    let qr = a.to_dense().qr();
    let q = qr.q();
    let r = qr.r();

    let scale = r.diagonal().amax().max(1e-300);
    if r.diagonal().iter().any(|d| d.abs() <= scale * 1e-12) {
        return Err(SolveError::Singular);
    }

    rhs.iter()
        .map(|b| {
            let qtb = q.tr_mul(b);
            r.solve_upper_triangular(&qtb).ok_or(SolveError::Singular)
        })
        .collect()
}
