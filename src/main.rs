use clap::Parser;
use env_logger::Env;
use humio::args::Args;
use humio::runner::Runner;
use std::io;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Usage mistakes exit 1; --help and --version exit 0.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let runner = match Runner::new(args) {
        Ok(runner) => runner,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = io::stdout();
    tokio::select! {
        result = runner.run(&mut stdout) => match result {
            Ok(code) => ExitCode::from(code as u8),
            Err(err) => {
                eprintln!("Error: {err:#}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            println!("Aborted - bye!");
            ExitCode::FAILURE
        }
    }
}
