//! Physical constants used for energy conversion.
//!
//! Positions are in mm, times in ns, velocities in mm/ns; this keeps the
//! magnitudes close to unity and limits rounding errors.

/// Speed of light in m/s.
pub const CLIGHT: f64 = 299_792_458.0;

/// Speed of light in mm/ns.
pub const CLIGHT_MM_PER_NS: f64 = CLIGHT * 1e-6;

/// Elementary charge in C.
pub const QELEM: f64 = 1.602_176_6e-19;

/// Electron rest mass in kg.
pub const ELECTRON_MASS_KG: f64 = 9.109_383_7e-31;

/// Electron rest mass energy in eV (m c^2 / q).
pub const ELECTRON_MASS_EV: f64 = ELECTRON_MASS_KG * CLIGHT * CLIGHT / QELEM;

/// Classical kinetic energy in eV of an electron moving at `speed_mm_per_ns`.
pub fn electron_kinetic_energy_ev(speed_mm_per_ns: f64) -> f64 {
    let beta = speed_mm_per_ns / CLIGHT_MM_PER_NS;
    0.5 * ELECTRON_MASS_EV * beta * beta
}
