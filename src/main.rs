fn main() {
    if let Err(err) = mes_csv_import::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
