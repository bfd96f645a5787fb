pub fn run() {
    println!("addon-health-core {}", env!("CARGO_PKG_VERSION"));
}
