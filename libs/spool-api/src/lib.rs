pub mod codec;
pub mod config;
pub mod error;
pub mod ffi;
pub mod metadata;
pub mod record;
pub mod storage;
pub mod util;
pub use util::now_nanos;
