//! Console output for the CLI

use colored::Colorize;

/// Print the banner shown before a run
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(title.chars().count()));
}

/// Print an indented list entry
pub fn print_item(item: &str) {
    println!("   - {}", item.cyan());
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message.red());
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
