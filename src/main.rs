use std::process;

fn main() {
    if let Err(err) = colligo::app::run() {
        eprintln!("fatal: {err:#}");
        process::exit(1);
    }
}
