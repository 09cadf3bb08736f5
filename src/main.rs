//! forestwatch CLI entry point.

#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

fn main() {
    if let Err(e) = forestwatch::run() {
        eprintln!("error: {e}");
        let code = if matches!(e, forestwatch::Error::Cancelled) {
            130
        } else {
            1
        };
        std::process::exit(code);
    }
}
