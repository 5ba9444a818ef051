fn main() {
    if let Err(err) = people_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
