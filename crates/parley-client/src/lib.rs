pub mod config;
pub mod controller;
pub mod events;
pub mod state;
pub mod view;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use controller::SyncController;
pub use events::ClientEvent;
pub use state::{Notice, SyncState};
pub use view::{ChatView, ScrollAction, ScrollTracker, ViewSnapshot, ViewUpdate};

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley=info,parley_client=debug,parley_net=debug,parley_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
