fn main() {
    if let Err(e) = rodbench_cli::run() {
        eprintln!("rodbench: {:#}", e);
        std::process::exit(1);
    }
}
