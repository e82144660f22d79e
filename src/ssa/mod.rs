#![allow(dead_code)]

pub mod def;
pub mod opt;
pub mod rewrite;
pub mod verify;

#[allow(unused_imports)]
pub use def::*;
