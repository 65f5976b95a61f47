fn main() {
    if let Err(e) = ct::run() {
        eprintln!("ct: {e:#}");
        std::process::exit(1);
    }
}
