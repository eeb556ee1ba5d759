pub mod conformance;
mod error;
mod memory;
mod push;
mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use push::{PushEvent, PushRecv, PushSubscription};
pub use traits::LedgerStore;
