//! Per-stage data block of an LQR problem.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::error::{LqrError, LqrResult};

/// Quadratic/linear data of a single stage.
///
/// Stage cost:
///
/// ```text
/// ℓ(x, u; θ) = ½ xᵀQx + xᵀSu + ½ uᵀRu + qᵀx + rᵀu
///            + xᵀΓₓθ + uᵀΓᵤθ + γᵀθ + ½ θᵀΓ_θθ
/// ```
///
/// Transition to the next stage (ignored on the terminal knot):
///
/// ```text
/// A x + B u + f + E x' = 0
/// ```
///
/// Stage equality constraint (`nc` rows, may be empty):
///
/// ```text
/// C x + D u + Γ_c θ + d = 0
/// ```
///
/// # Dimensions
///
/// - Q: nx × nx, S: nx × nu, R: nu × nu
/// - A: nx2 × nx, B: nx2 × nu, E: nx2 × nx2, f: nx2
/// - C: nc × nx, D: nc × nu, d: nc
/// - Γₓ: nx × nth, Γᵤ: nu × nth, Γ_θ: nth × nth, γ: nth, Γ_c: nc × nth
#[derive(Debug, Clone, PartialEq)]
#[allow(non_snake_case)] // matrices keep their mathematical names
pub struct LqrKnot {
    pub nx: usize,
    pub nu: usize,
    pub nc: usize,
    /// State dimension of the following knot.
    pub nx2: usize,
    /// Parameter dimension (0 until parameterized).
    pub nth: usize,

    pub Q: DMatrix<f64>,
    pub S: DMatrix<f64>,
    pub R: DMatrix<f64>,
    pub q: DVector<f64>,
    pub r: DVector<f64>,

    pub A: DMatrix<f64>,
    pub B: DMatrix<f64>,
    pub E: DMatrix<f64>,
    pub f: DVector<f64>,

    pub C: DMatrix<f64>,
    pub D: DMatrix<f64>,
    pub d: DVector<f64>,

    pub Gammax: DMatrix<f64>,
    pub Gammau: DMatrix<f64>,
    pub Gammath: DMatrix<f64>,
    pub gamma: DVector<f64>,
    pub Gammac: DMatrix<f64>,
}

impl LqrKnot {
    /// Zero knot with square dynamics (`nx2 = nx`) and `E = -I`.
    pub fn new(nx: usize, nu: usize, nc: usize) -> Self {
        Self::with_next_dim(nx, nu, nc, nx)
    }

    /// Zero knot whose transition lands in a state space of dimension `nx2`.
    pub fn with_next_dim(nx: usize, nu: usize, nc: usize, nx2: usize) -> Self {
        Self {
            nx,
            nu,
            nc,
            nx2,
            nth: 0,
            Q: DMatrix::zeros(nx, nx),
            S: DMatrix::zeros(nx, nu),
            R: DMatrix::zeros(nu, nu),
            q: DVector::zeros(nx),
            r: DVector::zeros(nu),
            A: DMatrix::zeros(nx2, nx),
            B: DMatrix::zeros(nx2, nu),
            E: -DMatrix::identity(nx2, nx2),
            f: DVector::zeros(nx2),
            C: DMatrix::zeros(nc, nx),
            D: DMatrix::zeros(nc, nu),
            d: DVector::zeros(nc),
            Gammax: DMatrix::zeros(nx, 0),
            Gammau: DMatrix::zeros(nu, 0),
            Gammath: DMatrix::zeros(0, 0),
            gamma: DVector::zeros(0),
            Gammac: DMatrix::zeros(nc, 0),
        }
    }

    /// Allocate zeroed parameter blocks of dimension `nth`.
    pub fn add_parameterization(&mut self, nth: usize) {
        self.nth = nth;
        self.Gammax = DMatrix::zeros(self.nx, nth);
        self.Gammau = DMatrix::zeros(self.nu, nth);
        self.Gammath = DMatrix::zeros(nth, nth);
        self.gamma = DVector::zeros(nth);
        self.Gammac = DMatrix::zeros(self.nc, nth);
    }

    /// Check every block against the declared dimensions.
    ///
    /// `stage` is only used to tag the error. Dynamics blocks are skipped on
    /// the terminal knot.
    pub fn validate(&self, stage: usize, terminal: bool) -> LqrResult<()> {
        let (nx, nu, nc, nth) = (self.nx, self.nu, self.nc, self.nth);

        check_mat(stage, "Q", &self.Q, nx, nx)?;
        check_mat(stage, "S", &self.S, nx, nu)?;
        check_mat(stage, "R", &self.R, nu, nu)?;
        check_vec(stage, "q", &self.q, nx)?;
        check_vec(stage, "r", &self.r, nu)?;

        check_mat(stage, "C", &self.C, nc, nx)?;
        check_mat(stage, "D", &self.D, nc, nu)?;
        check_vec(stage, "d", &self.d, nc)?;

        check_mat(stage, "Gammax", &self.Gammax, nx, nth)?;
        check_mat(stage, "Gammau", &self.Gammau, nu, nth)?;
        check_mat(stage, "Gammath", &self.Gammath, nth, nth)?;
        check_vec(stage, "gamma", &self.gamma, nth)?;
        check_mat(stage, "Gammac", &self.Gammac, nc, nth)?;

        if !terminal {
            let nx2 = self.nx2;
            check_mat(stage, "A", &self.A, nx2, nx)?;
            check_mat(stage, "B", &self.B, nx2, nu)?;
            check_mat(stage, "E", &self.E, nx2, nx2)?;
            check_vec(stage, "f", &self.f, nx2)?;
        }
        Ok(())
    }

    /// Stage cost `ℓ(x, u; θ)`. Shapes are assumed validated.
    pub fn cost(&self, x: &DVector<f64>, u: &DVector<f64>, theta: &DVector<f64>) -> f64 {
        let mut val = 0.5 * x.dot(&(&self.Q * x)) + self.q.dot(x);
        if self.nu > 0 {
            val += x.dot(&(&self.S * u)) + 0.5 * u.dot(&(&self.R * u)) + self.r.dot(u);
        }
        if self.nth > 0 {
            val += x.dot(&(&self.Gammax * theta))
                + self.gamma.dot(theta)
                + 0.5 * theta.dot(&(&self.Gammath * theta));
            if self.nu > 0 {
                val += u.dot(&(&self.Gammau * theta));
            }
        }
        val
    }

    /// Constraint value `C x + D u + Γ_c θ + d`.
    pub fn constraint_value(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        theta: &DVector<f64>,
    ) -> DVector<f64> {
        let mut c = &self.C * x + &self.d;
        if self.nu > 0 {
            c += &self.D * u;
        }
        if self.nth > 0 {
            c += &self.Gammac * theta;
        }
        c
    }

    /// Dynamics residual `A x + B u + f + E x'`.
    pub fn dynamics_residual(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        xnext: &DVector<f64>,
    ) -> DVector<f64> {
        let mut res = &self.A * x + &self.f + &self.E * xnext;
        if self.nu > 0 {
            res += &self.B * u;
        }
        res
    }
}

fn check_mat(
    stage: usize,
    name: &str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> LqrResult<()> {
    if m.shape() != (rows, cols) {
        return Err(LqrError::dim(
            stage,
            format!(
                "{} has shape {}×{}, expected {}×{}",
                name,
                m.nrows(),
                m.ncols(),
                rows,
                cols
            ),
        ));
    }
    Ok(())
}

fn check_vec(stage: usize, name: &str, v: &DVector<f64>, len: usize) -> LqrResult<()> {
    if v.len() != len {
        return Err(LqrError::dim(
            stage,
            format!("{} has length {}, expected {}", name, v.len(), len),
        ));
    }
    Ok(())
}

impl fmt::Display for LqrKnot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LqrKnot {{ nx: {}, nu: {}, nc: {}, nx2: {}, nth: {} }}",
            self.nx, self.nu, self.nc, self.nx2, self.nth
        )
    }
}
