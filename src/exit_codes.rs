/// Process exit codes for the `run` subcommand, one per terminal overall
/// status.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const CANCELED: i32 = 2;
    pub const PARTIAL: i32 = 3;
}
