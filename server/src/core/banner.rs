//! Startup banner

use super::constants::APP_NAME;
use crate::utils::terminal::terminal_link;

/// Print the startup banner
pub fn print_banner(data_dir: &str) {
    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("  \x1b[90m➜  {:<21} {}\x1b[0m", "Data:", data_dir);
    println!();
}

/// Print update notification after banner
pub fn print_update_available(current: &str, new_version: &str) {
    let npm_url = "https://www.npmjs.com/package/chatfabric";
    println!(
        "  \x1b[33m[Update available]\x1b[0m v{} -> v{}",
        current, new_version
    );
    println!("  Run: \x1b[36mnpm install -g chatfabric\x1b[0m");
    println!("  {}", terminal_link(npm_url));
    println!();
}
