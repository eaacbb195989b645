//! Digests, the failure context and the validators

pub mod checksum_validator;
pub mod collision_validator;
pub mod context;
pub mod digest;
pub mod remote;
pub mod runner;
