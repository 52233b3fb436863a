pub mod codec;
pub mod digest;
pub mod engine;
pub mod path;
pub mod row;

pub use codec::CodecDescriptor;
pub use digest::DigestAlgorithm;
pub use engine::{FileTransferAgent, TransferReport};
pub use path::LocalFile;
pub use row::{GetRow, PutRow, ResultRow, TransferResult, TransferStatus};
