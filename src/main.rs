fn main() {
    if let Err(err) = docmerge::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
