//! Core primitive types shared across the Tidemark codebase.

mod buf;
pub mod hash;
pub mod merkle;

pub use buf::Buf32;
