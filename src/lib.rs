//! Post-processing engine for multipactor simulation exports: particle
//! trajectory bookkeeping, population growth-rate fitting, multipactor
//! order detection and mesh collision classification.

pub mod analysis;
pub mod classify;
pub mod geometry;
pub mod population;
pub mod records;
pub mod store;
