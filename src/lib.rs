//! Monte Carlo retirement-sustainability engine.
//!
//! [`core`] holds the pure simulation pipeline (path generation, projection,
//! parallel run execution, aggregation, risk classification and sensitivity
//! sweeps). [`api`] is the thin CLI/HTTP caller layer around it.

pub mod api;
pub mod core;
