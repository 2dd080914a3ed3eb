mod algorithm;
mod device_id;
mod device_type;
mod key_material;
mod protocol;
mod server_key;
mod slot;
mod transaction;

pub use algorithm::KeyAlgorithm;
pub use device_id::{DeviceId, DeviceIdError};
pub use device_type::DeviceType;
pub use key_material::{pem_label, KeyMaterialError, KeyPair, PublicKey};
pub use protocol::Protocol;
pub use server_key::{ServerAddress, ServerKeyRecord};
pub use slot::Slot;
pub use transaction::{DoctorStep, ProvisioningTransaction};
