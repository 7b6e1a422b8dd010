//! Controller layer: worker events and error modeling for the UI.

pub mod events;
