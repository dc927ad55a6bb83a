// gallery-common: shared types and helpers for the gallery workspace

pub mod filename;
pub mod media;
pub mod types;
