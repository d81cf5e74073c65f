pub mod decoder;
pub mod local;
pub mod memory;
pub mod naming;
pub mod object;

pub use decoder::{decode_records, locate_boundary, reconstruct, DecodeError};
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
pub use naming::{synthesize_key, NamingError, ObjectKey, ResourceIdentity, ResourceType};
pub use object::{BlobStore, ByteRange, SourceObject, TransportError};
