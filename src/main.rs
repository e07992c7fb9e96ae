fn main() {
    if let Err(err) = timevault::run() {
        eprintln!("[ERROR] {err:#}");
        std::process::exit(1);
    }
}
