//! `ra-agent`: turn engine, tool gateway and autoplay for relay-agent.
//!
//! A host supplies a [`backend::ModelBackend`] and a
//! [`display::DisplaySink`]; [`runtime::Agent`] does the rest.

pub mod backend;
pub mod bootstrap;
pub mod cli;
pub mod compress;
pub mod display;
pub mod gateway;
pub mod local_tools;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;
