pub mod codec;
mod keygen;
pub mod layout;

pub use keygen::generate_key_pair;
pub use layout::{DeviceLayout, SlotRegion};
