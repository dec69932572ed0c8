// ── Domain model ──
//
// The small closed set of record types flowing through the engine.
// Everything is validated at the ingestion boundary; nothing downstream
// handles untyped maps.

mod alert;
mod device;
mod mac;
mod subscription;

pub use alert::{Alert, Severity};
pub use device::{Device, DeviceStatus, PLACEHOLDER_NAME, is_real_name};
pub use mac::MacAddress;
pub use subscription::{PushKeys, PushSubscription};
