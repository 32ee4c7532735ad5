//! Hardware interaction modules
//!
//! Attribute resolution, state reading and the `Platform` seam that every
//! hardware write goes through.

mod attributes;
mod platform;
mod state;

pub use attributes::{read_int, write_int, AttributeBackend, AttributeResolver, ResolvedAttribute};
#[cfg(test)]
pub use platform::MockPlatform;
pub use platform::{find_binary, reload_udev_rules, Platform, SysfsPlatform};
pub use state::{read_snapshot, HardwareSnapshot, MuxMode};
