//! Core clock types

pub mod time;
