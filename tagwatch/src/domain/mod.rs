//! Domain types shared by the monitor, the dispatcher and handlers.

mod item;

pub use item::{Item, TagEvent, TagScope, Topic};
