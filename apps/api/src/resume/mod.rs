// Stored résumé: persistence, preview markup and its HTTP surface.

pub mod handlers;
pub mod preview;
pub mod store;

pub use store::{ResumeStore, StoreError};
