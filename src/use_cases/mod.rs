//! Use cases (orchestration)
//!
//! Each use case composes the DFU transport, the key codec and the key
//! store (and the cloud registrar where a workflow needs it) into one
//! provisioning operation. Progress lines go to the writer handed in.

mod doctor;
mod flash;
mod load_keys;
mod new_keys;
mod read_server;
mod save_keys;
mod send_key;
mod server_key;

pub use doctor::{doctor, CancelFlag, DoctorOptions};
pub use load_keys::load_keys;
pub use new_keys::{new_keys, NewKeysOptions};
pub use read_server::{server_address, transport_protocol};
pub use save_keys::{read_device_public_key, save_keys, SaveKeysOptions};
pub use send_key::{register_with_cloud, send_key};
pub use server_key::{
    format_server_key, server_key, ServerKeyOptions, ServerKeys, FILENAME_REQUIRED,
};
