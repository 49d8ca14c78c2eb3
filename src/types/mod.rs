// ABOUTME: Request vocabulary and type-safe resource identifiers.
// ABOUTME: Method and Kind are the wire words; Id<T> keeps resource ids apart.

mod id;
mod method;

pub use id::{ContainerId, Id, ImageId, NamespaceId, NetworkId, PodId};
pub use method::{Kind, Method};
