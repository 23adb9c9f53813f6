//! Operation packages — pure callables registered by name.
//!
//! Each package ships a `register_*` helper; the engine itself never
//! depends on any particular op being present.

pub mod poly;
pub mod stdlib;
