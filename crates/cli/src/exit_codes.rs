//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Domain    | Description                                        |
//! |------|-----------|----------------------------------------------------|
//! | 0    | Universal | Success                                            |
//! | 1    | Universal | General error (I/O, unreadable input, bad config)  |
//! | 2    | Universal | CLI usage error (bad args, unknown column)         |
//! | 3    | calc      | Formula evaluated to an error                      |
//! | 4    | test      | Significance test could not be computed            |
//!
//! A command that exits 3 or 4 still prints its JSON result on stdout.

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - input could not be read or parsed, or settings are invalid.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown column names.
pub const EXIT_USAGE: u8 = 2;

/// `calc` produced an error outcome (`#REF!`, `#CIRC!`, ...).
pub const EXIT_FORMULA_ERROR: u8 = 3;

/// `test` returned `ok: false`.
pub const EXIT_TEST_NOT_COMPUTABLE: u8 = 4;
