//! Help message display for CLI.

#![allow(clippy::print_stdout)]

/// Print the setup guide shown when no imagery project is configured.
pub fn print_first_time_help() {
    println!("No Earth Engine project configured. Get started with forestwatch:");
    println!();
    println!("1. Initialize configuration:");
    println!("   forestwatch config init");
    println!();
    println!("2. Set your project and OAuth client in the config file:");
    println!("   [earth_engine]");
    println!("   project = \"my-cloud-project\"");
    println!("   [auth]");
    println!("   client_id = \"...\"");
    println!("   client_secret = \"...\"");
    println!();
    println!("3. Authorize access to Earth Engine and Drive:");
    println!("   forestwatch auth");
    println!();
    println!("4. Select an area and run:");
    println!("   forestwatch select --lat -14.235 --lon -51.9253 --radius 500");
    println!("   forestwatch");
    println!();
    println!("Run 'forestwatch -h' for all options.");
}
