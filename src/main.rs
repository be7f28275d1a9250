//! Default binary - shows help text.

fn main() {
    println!("snmpfarm {} - SNMP Agent-Farm Simulator", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Available commands:");
    println!("  snmpfarm-daemon   Run the simulator");
    println!("  snmpfarm-walk     Validate and inspect walk files");
    println!();
    println!("For more information, run any command with --help");
}
