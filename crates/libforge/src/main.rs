fn main() {
    if let Err(err) = libforge::run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
