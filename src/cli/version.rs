/// Display version information
pub fn execute() {
    println!("nodegate {}", env!("CARGO_PKG_VERSION"));
    println!("Discord bot linking reporting nodes to members, with activity roles");
}
