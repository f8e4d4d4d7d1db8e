// Managers are public; the traits in `traits` are the seams between them.

pub mod traits;     // Global contracts
pub mod command;    // Process execution
pub mod domain;     // Hostname validation
pub mod layout;     // Filesystem layout
pub mod files;      // Atomic writes & cleanup
pub mod render;     // Config templates
pub mod user;       // Service account resolution
pub mod daemon;     // nginx / systemctl control
pub mod probe;      // Reachability checks
pub mod init;       // Base configuration
pub mod install;    // Site installation
pub mod remove;     // Site removal

#[cfg(test)]
pub mod testing;
