pub mod buffer;
pub mod convert;
pub mod decode;
pub mod error;
pub mod metadata;
