//! Entities - references and snapshots of remote domain objects

mod entity;
mod kind;
mod reference;

pub use entity::Entity;
pub use kind::EntityKind;
pub use reference::EntityRef;
