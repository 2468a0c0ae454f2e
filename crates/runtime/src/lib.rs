pub mod mailbox;
pub mod pending;

pub use mailbox::*;
pub use pending::*;
