pub mod provider;
pub mod storage;
pub mod window_channel;

pub use provider::{InjectedProvider, ProviderEvents};
pub use storage::ChromeStore;
pub use window_channel::WindowChannel;
