use pi_link::cli;

fn main() {
    // Parse CLI arguments first (before logging init for cleaner --help output)
    let options = cli::process_cli();

    // Route log::info!() etc. to /tmp/pi_link_debug.log.
    // --log-level takes precedence over RUST_LOG; RUST_LOG also mirrors to stderr.
    pi_link::debug::init_log_bridge(options.log_level);

    log::info!("Running {:?}", options.command);
    let code = cli::run(&options);
    log::logger().flush();

    std::process::exit(code);
}
