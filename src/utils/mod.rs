// Utils

pub mod logging;
pub mod prometheus_metrics;
pub mod signal;

pub use logging::init_logging;
pub use signal::{cancel_on_signal, shutdown_signal};
