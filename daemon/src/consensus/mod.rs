mod fork;

pub use fork::{Connection, Fork};
