//! `pktc` is the mid-end of a compiler for a P4-like packet processing
//! language. Programs are built as IR (see [`ir`]), run through the
//! [`middle::midend::MidEnd`] pipelines and come out inlined, cleaned up and
//! evaluated into a block map.

pub mod diagnostics;
pub mod fixtures;
pub mod index;
pub mod intern;
pub mod ir;
pub mod middle;
pub mod options;
