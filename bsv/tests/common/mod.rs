#![allow(dead_code)]

pub mod config;
pub mod helpers;
pub mod remote;
