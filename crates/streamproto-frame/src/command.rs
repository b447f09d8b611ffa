//! Command identifiers carried in a frame's command byte.
//!
//! IDs below 100 are system calls executed by the device kernel.
//! IDs from 100 up are console plumbing and liveness checks.

/// List a directory (payload: optional path).
pub const SYS_LS: u8 = 1;

/// Start a program (payload: `<wait> <program> [arg]`).
pub const SYS_EXEC: u8 = 2;

/// Change the working directory (payload: path).
pub const SYS_CHDIR: u8 = 3;

/// Print the working directory.
pub const SYS_GETCWD: u8 = 4;

/// Host → device keyboard input.
pub const CMD_STDIN: u8 = 100;

/// Device → host console output.
pub const CMD_STDOUT: u8 = 101;

/// Device → host error output.
pub const CMD_STDERR: u8 = 102;

/// Liveness probe.
pub const CMD_PING: u8 = 200;

/// Liveness reply.
pub const CMD_PONG: u8 = 201;

/// First ID outside the system call range.
pub const SYSCALL_LIMIT: u8 = 100;

/// Returns a human-readable name for a command ID.
pub fn command_name(id: u8) -> &'static str {
    match id {
        SYS_LS => "LS",
        SYS_EXEC => "EXEC",
        SYS_CHDIR => "CHDIR",
        SYS_GETCWD => "GETCWD",
        CMD_STDIN => "STDIN",
        CMD_STDOUT => "STDOUT",
        CMD_STDERR => "STDERR",
        CMD_PING => "PING",
        CMD_PONG => "PONG",
        0..SYSCALL_LIMIT => "SYSCALL",
        _ => "UNKNOWN",
    }
}

/// Returns true if the ID is dispatched to the device's system call table.
pub fn is_syscall(id: u8) -> bool {
    id < SYSCALL_LIMIT
}
