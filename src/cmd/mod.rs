//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Once`, `Loop`   |
//! | `config` | `Config`         |
//! | `report` | `Report`         |

pub mod config;
pub mod report;
pub mod run;

pub use config::cmd_config;
pub use report::cmd_report;
pub use run::{cmd_loop, cmd_once};
