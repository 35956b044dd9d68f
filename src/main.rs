fn main() {
    if let Err(err) = commission_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
