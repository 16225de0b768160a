fn main() {
    if let Err(e) = causerie::cli::main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
