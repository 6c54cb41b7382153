//! # frontier-rs
//!
//! $$
//! \mathbf{w}^\* = \arg\min_{\mathbf{1}^\top\mathbf{w}=1,\ \ell\le\mathbf{w}\le u} \mathbf{w}^\top\Sigma\mathbf{w}
//! $$
//!
//! Minimum-variance and maximum-Sharpe portfolio allocation from historical prices.

pub mod error;
pub mod io;
pub mod portfolio;
pub mod report;

pub use error::PortfolioError;
