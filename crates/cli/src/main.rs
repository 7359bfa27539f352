fn main() {
    if let Err(error) = xjoin_cli::run() {
        // run() installs the subscriber right after argument parsing
        tracing::error!(%error, "CLI execution failed");
        std::process::exit(1);
    }
}
