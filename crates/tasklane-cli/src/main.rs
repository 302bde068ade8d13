use std::ffi::OsString;

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();
    if let Err(err) = tasklane_core::run(args) {
        eprintln!("error: {err:#}");
        if tasklane_core::requires_login(&err) {
            eprintln!("hint: run `tasklane login` to start a new session");
        }
        std::process::exit(1);
    }
}
