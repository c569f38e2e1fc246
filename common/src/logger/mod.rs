mod init;
mod run_id;
mod spans;

pub use init::init_logger;
pub use run_id::RunId;
pub use spans::{phase_span, run_span, warn_if_slow};
