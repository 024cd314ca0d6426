//! reelpress presses a set of uploaded images into a rendered video by
//! orchestrating an external renderer process, archiving every produced
//! artifact and sweeping all transient state on every exit path.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
