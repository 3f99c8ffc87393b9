fn main() {
  // Initialize structured logging early
  let home = cccc_core::config::resolve_home().unwrap_or_else(|_| std::path::PathBuf::from("."));
  let cfg = cccc_core::config::load(Some(&home))
    .unwrap_or_else(|_| cccc_core::config::Config::default());
  let log_path = cccc_core::adapters::fs::logs_path(&home);
  cccc_core::logging::init(&log_path, cfg.log_level);

  cli::run();
}
