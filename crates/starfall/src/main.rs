use std::process::ExitCode;

mod app;
mod cli;
mod logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match cli::Options::parse(args.iter().map(String::as_str)) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!();
            eprintln!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };

    if options.show_help {
        println!("{}", cli::USAGE);
        return ExitCode::SUCCESS;
    }
    if options.show_version {
        println!("starfall-launcher {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    logging::init_logging();

    match app::run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
