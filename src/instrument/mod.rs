//! Instrument drivers.
//!
//! One driver lives here: the two-port vector network analyzer in
//! [`vna`]. The driver layer owns intent validation and result assembly;
//! wire traffic goes through [`crate::session`].

pub mod vna;

pub use vna::Vna;
