fn main() {
    if let Err(err) = plumbline::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
