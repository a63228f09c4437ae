//! The mid-end. Programs are simplified, evaluated into a block map, and then
//! inlined and cleaned up before a final evaluation. Everything here operates
//! on the IR in [`crate::ir`] and reports through [`crate::diagnostics`].

pub mod midend;
pub mod pass;
pub mod passes;
pub mod reference_map;
