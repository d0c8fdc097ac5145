use std::io::Write;
use std::process::ExitCode;

use ocurl::{Curl, Raw};

fn main() -> ExitCode {
    env_logger::init();

    let mut curl = Curl::default();
    curl.opt(std::env::args().skip(1));

    let execution = curl.exec();
    let body = execution.stdout(&Raw, Vec::new());

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout.write_all(&body).and_then(|_| stdout.flush()) {
        eprintln!("ocurl: failed to write stdout: {}", e);
        return ExitCode::FAILURE;
    }

    if execution.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
