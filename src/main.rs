fn main() {
    if let Err(err) = meshmap_tiles::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
