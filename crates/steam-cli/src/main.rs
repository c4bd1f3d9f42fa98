fn main() {
    if let Err(e) = steam_cli::runner::main(std::env::args().collect()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
