//! Dense linear algebra: Cholesky helpers and the monolithic KKT oracle.

pub mod dense;
pub mod kkt;

pub use dense::{factor_spd, SpdFactor};
pub use kkt::{kkt_residuals, KktResiduals, KktSystem};
