//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                   |
//! |-----------|----------------------------------------------------|
//! | `run`     | the seven phase verbs, `Full`                      |
//! | `program` | `Program`                                          |
//! | `status`  | `Status`                                           |
//! | `project` | `Init`, `Acknowledge`, `Reopen`                    |

pub mod program;
pub mod project;
pub mod run;
pub mod status;

pub use program::cmd_program;
pub use project::{cmd_acknowledge, cmd_init, cmd_reopen};
pub use run::{run_full, run_single_phase};
pub use status::cmd_status;
