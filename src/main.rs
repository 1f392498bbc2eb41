fn main() {
    if let Err(err) = knowitall_lib::run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
