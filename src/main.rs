fn main() {
    if let Err(e) = healthtwin_lib::run() {
        tracing::error!(error = %e, "healthtwin stopped");
        eprintln!("healthtwin: {e}");
        std::process::exit(1);
    }
}
