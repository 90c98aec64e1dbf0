pub mod logging;
pub mod shutdown;

pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::cancel_on_shutdown;
