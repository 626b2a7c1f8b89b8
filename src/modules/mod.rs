//! Building blocks of the polynomial mixer.
//!
//! Leaf-first: activation and polynomial expansion, masked reduction, the
//! aggregation entry point, and the linear projection helpers.

pub mod aggregate;
pub mod linear;
pub mod mask;
pub mod polynomial;
